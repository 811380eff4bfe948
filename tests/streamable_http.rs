//! End-to-end scenarios exercised against a real HTTP server: an `axum`
//! app on an ephemeral port, `anyhow::Result` test functions, and
//! `tokio::sync::Notify` for cross-task synchronization.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use mcp_streamable_client::{
    JsonRpcMessage, ReqwestFetch, TransportBuilder, TransportConfig,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use url::Url;

async fn spawn(app: Router) -> anyhow::Result<Url> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(async move { axum::serve(listener, app).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(Url::parse(&format!("http://127.0.0.1:{port}/mcp"))?)
}

#[tokio::test]
async fn simple_post_is_accepted_with_no_delivered_message() -> anyhow::Result<()> {
    async fn accept_everything() -> impl IntoResponse {
        StatusCode::ACCEPTED
    }

    let app = Router::new().route("/mcp", post(accept_everything));
    let endpoint = spawn(app).await?;

    let delivered = Arc::new(AtomicUsize::new(0));
    let delivered_clone = delivered.clone();
    let transport = TransportBuilder::new(ReqwestFetch::default(), TransportConfig::new(endpoint))
        .on_message(move |_| {
            delivered_clone.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    transport.start()?;

    transport
        .send(JsonRpcMessage::notification(
            "notifications/ping",
            json!({}),
        ))
        .await?;

    assert_eq!(delivered.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn session_id_is_captured_from_an_sse_initialize_response_and_reused() -> anyhow::Result<()>
{
    #[derive(Clone, Default)]
    struct ServerState {
        second_request_session_header: Arc<Mutex<Option<String>>>,
        second_request_seen: Arc<Notify>,
    }

    async fn mcp_handler(
        State(state): State<ServerState>,
        headers: HeaderMap,
        body: axum::body::Bytes,
    ) -> axum::response::Response {
        let json_body: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
        let method = json_body.get("method").and_then(|m| m.as_str());

        if method == Some("initialize") {
            let event = format!(
                "data: {}\n\n",
                json!({
                    "jsonrpc": "2.0",
                    "id": json_body.get("id"),
                    "result": {"protocolVersion": "2024-11-05"}
                })
            );
            return (
                StatusCode::OK,
                [
                    (axum::http::header::CONTENT_TYPE, "text/event-stream"),
                    (
                        axum::http::HeaderName::from_static("mcp-session-id"),
                        "sess-from-sse",
                    ),
                ],
                event,
            )
                .into_response();
        }

        let seen = headers
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        *state.second_request_session_header.lock().unwrap() = seen;
        state.second_request_seen.notify_one();
        StatusCode::ACCEPTED.into_response()
    }

    let state = ServerState::default();
    let app = Router::new()
        .route("/mcp", post(mcp_handler))
        .with_state(state.clone());
    let endpoint = spawn(app).await?;

    let transport = TransportBuilder::new(ReqwestFetch::default(), TransportConfig::new(endpoint))
        .build();
    transport.start()?;

    transport
        .send(JsonRpcMessage::request(
            "init-1",
            "initialize",
            json!({}),
        ))
        .await?;

    assert_eq!(transport.session_id().as_deref(), Some("sess-from-sse"));

    transport
        .send(JsonRpcMessage::notification(
            "notifications/initialized",
            json!({}),
        ))
        .await?;

    tokio::time::timeout(Duration::from_secs(5), state.second_request_seen.notified())
        .await?;
    assert_eq!(
        state.second_request_session_header.lock().unwrap().as_deref(),
        Some("sess-from-sse")
    );
    Ok(())
}

#[tokio::test]
async fn terminate_session_sends_delete_and_clears_the_session_id() -> anyhow::Result<()> {
    #[derive(Clone, Default)]
    struct ServerState {
        delete_seen_session_header: Arc<Mutex<Option<String>>>,
    }

    async fn initialize_handler(
        State(_state): State<ServerState>,
        body: axum::body::Bytes,
    ) -> axum::response::Response {
        let json_body: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
        (
            StatusCode::OK,
            [
                (axum::http::header::CONTENT_TYPE, "application/json"),
                (
                    axum::http::HeaderName::from_static("mcp-session-id"),
                    "sess-to-terminate",
                ),
            ],
            json!({
                "jsonrpc": "2.0",
                "id": json_body.get("id"),
                "result": {}
            })
            .to_string(),
        )
            .into_response()
    }

    async fn delete_handler(State(state): State<ServerState>, headers: HeaderMap) -> StatusCode {
        let seen = headers
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        *state.delete_seen_session_header.lock().unwrap() = seen;
        StatusCode::OK
    }

    let state = ServerState::default();
    let app = Router::new()
        .route("/mcp", post(initialize_handler).delete(delete_handler))
        .with_state(state.clone());
    let endpoint = spawn(app).await?;

    let transport = TransportBuilder::new(ReqwestFetch::default(), TransportConfig::new(endpoint))
        .build();
    transport.start()?;

    transport
        .send(JsonRpcMessage::request("init-1", "initialize", json!({})))
        .await?;
    assert_eq!(transport.session_id().as_deref(), Some("sess-to-terminate"));

    transport.terminate_session().await?;

    assert_eq!(
        state.delete_seen_session_header.lock().unwrap().as_deref(),
        Some("sess-to-terminate")
    );
    assert_eq!(transport.session_id(), None);
    Ok(())
}

#[tokio::test]
async fn two_concurrent_requests_each_get_their_own_sse_stream() -> anyhow::Result<()> {
    #[derive(Clone, Default)]
    struct ServerState {
        delivered: Arc<Mutex<Vec<String>>>,
        both_seen: Arc<Notify>,
    }

    async fn mcp_handler(body: axum::body::Bytes) -> axum::response::Response {
        let json_body: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
        let id = json_body.get("id").cloned().unwrap_or_default();
        let event = format!(
            "data: {}\n\n",
            json!({"jsonrpc": "2.0", "id": id, "result": {"ok": true}})
        );
        (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
            event,
        )
            .into_response()
    }

    let state = ServerState::default();
    let app = Router::new().route("/mcp", post(mcp_handler));
    let endpoint = spawn(app).await?;

    let delivered = state.delivered.clone();
    let both_seen = state.both_seen.clone();
    let transport = TransportBuilder::new(ReqwestFetch::default(), TransportConfig::new(endpoint))
        .on_message(move |message| {
            let mut seen = delivered.lock().unwrap();
            seen.push(message.id.map(|id| id.to_string()).unwrap_or_default());
            if seen.len() >= 2 {
                both_seen.notify_one();
            }
        })
        .build();
    transport.start()?;

    let (first, second) = tokio::join!(
        transport.send(JsonRpcMessage::request("request1", "test", json!({}))),
        transport.send(JsonRpcMessage::request("request2", "test", json!({}))),
    );
    first?;
    second?;

    tokio::time::timeout(Duration::from_secs(5), state.both_seen.notified()).await?;

    let mut ids = state.delivered.lock().unwrap().clone();
    ids.sort();
    assert_eq!(ids, vec!["request1".to_string(), "request2".to_string()]);
    Ok(())
}

#[tokio::test]
async fn standalone_stream_open_with_a_resumption_token_carries_last_event_id() -> anyhow::Result<()>
{
    #[derive(Clone, Default)]
    struct ServerState {
        last_event_id_seen: Arc<Mutex<Option<String>>>,
    }

    async fn get_handler(State(state): State<ServerState>, headers: HeaderMap) -> axum::response::Response {
        let seen = headers
            .get("last-event-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        *state.last_event_id_seen.lock().unwrap() = seen;
        (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
            String::new(),
        )
            .into_response()
    }

    let state = ServerState::default();
    let app = Router::new()
        .route("/mcp", get(get_handler))
        .with_state(state.clone());
    let endpoint = spawn(app).await?;

    let transport = TransportBuilder::new(ReqwestFetch::default(), TransportConfig::new(endpoint))
        .build();
    transport.start()?;

    transport
        .open_standalone_stream(Some("test-event-id".to_string()))
        .await?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        state.last_event_id_seen.lock().unwrap().as_deref(),
        Some("test-event-id")
    );
    Ok(())
}

#[cfg(feature = "auth")]
#[tokio::test]
async fn a_401_with_no_silent_refresh_redirects_and_surfaces_unauthorized() -> anyhow::Result<()> {
    use mcp_streamable_client::auth::{AuthError, AuthProvider, ClientInformation, OAuthTokens};
    use mcp_streamable_client::TransportError;

    struct NoRefreshProvider {
        redirect_count: AtomicUsize,
        metadata: serde_json::Value,
    }

    #[async_trait::async_trait]
    impl AuthProvider for NoRefreshProvider {
        fn tokens(&self) -> Option<OAuthTokens> {
            None
        }

        fn client_information(&self) -> Option<ClientInformation> {
            None
        }

        async fn save_tokens(&self, _tokens: OAuthTokens) {}

        async fn save_code_verifier(&self, _verifier: String) {}

        async fn code_verifier(&self) -> Option<String> {
            None
        }

        fn redirect_to_authorization(&self) {
            self.redirect_count.fetch_add(1, Ordering::SeqCst);
        }

        fn redirect_url(&self) -> &str {
            "http://localhost/callback"
        }

        fn client_metadata(&self) -> &serde_json::Value {
            &self.metadata
        }

        async fn refresh(&self) -> Result<Option<OAuthTokens>, AuthError> {
            Ok(None)
        }
    }

    async fn always_unauthorized() -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    let app = Router::new().route("/mcp", post(always_unauthorized));
    let endpoint = spawn(app).await?;

    let provider = Arc::new(NoRefreshProvider {
        redirect_count: AtomicUsize::new(0),
        metadata: json!({}),
    });
    let config = TransportConfig::new(endpoint).with_auth_provider(provider.clone());
    let transport = TransportBuilder::new(ReqwestFetch::default(), config).build();
    transport.start()?;

    let result = transport
        .send(JsonRpcMessage::notification("test", json!({})))
        .await;

    assert!(matches!(result, Err(TransportError::Unauthorized)));
    assert_eq!(provider.redirect_count.load(Ordering::SeqCst), 1);
    Ok(())
}
