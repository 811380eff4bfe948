use thiserror::Error;

#[cfg(feature = "auth")]
use crate::auth::AuthError;

/// §7 requires the verb in an `HttpError` message to match the request that
/// failed, not always read "POSTing" regardless of method.
fn http_error_message(method: &http::Method, status: u16, status_text: &str) -> String {
    let gerund = match method.as_str() {
        "POST" => "POSTing".to_string(),
        "GET" => "GETting".to_string(),
        "DELETE" => "DELETEing".to_string(),
        other => format!("{other}ing"),
    };
    format!("Error {gerund} to endpoint (HTTP {status}): {status_text}")
}

/// Every error kind the transport can surface to a caller, either as the
/// rejection of a `send`/`terminate_session` call, or via `onerror`.
#[derive(Debug, Error)]
pub enum TransportError<E: std::error::Error + Send + Sync + 'static> {
    #[error("{}", http_error_message(method, *status, status_text))]
    HttpError {
        method: http::Method,
        status: u16,
        status_text: String,
        body: Option<String>,
    },
    #[error(
        "Unauthorized: the auth provider could not refresh silently; user interaction is required"
    )]
    Unauthorized,
    #[error("Unexpected content type: {0:?}")]
    UnexpectedContentType(Option<String>),
    #[error("failed to parse SSE event payload as a JSON-RPC message: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("transport is closed")]
    ConnectionClosed,
    #[error("SSE stream exhausted its reconnection budget")]
    ReconnectExhausted,
    #[error("transport already started")]
    AlreadyStarted,
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Tokio join error: {0}")]
    TokioJoinError(#[from] tokio::task::JoinError),
    #[error("HTTP client error: {0}")]
    Client(E),
    #[cfg(feature = "auth")]
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

impl<E: std::error::Error + Send + Sync + 'static> TransportError<E> {
    pub fn http(method: http::Method, status: http::StatusCode, body: Option<String>) -> Self {
        Self::HttpError {
            method,
            status: status.as_u16(),
            status_text: status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string(),
            body,
        }
    }
}
