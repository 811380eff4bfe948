//! The Request Dispatcher (spec §4.2): classifies an HTTP response into
//! one of the outcomes the Transport Controller knows how to act on.

use futures::StreamExt;
use http::{HeaderMap, StatusCode};

use crate::{
    error::TransportError,
    fetch::{BodyStream, HttpResponse},
    headers::{RequestKind, SESSION_ID_HEADER},
    message::InboundPayload,
};

pub enum Classified<E: std::error::Error + Send + Sync + 'static> {
    /// 202: no body expected.
    Accepted,
    /// 200 `application/json` (or no content-type at all).
    Json {
        messages: Vec<crate::message::JsonRpcMessage>,
        session_id: Option<String>,
    },
    /// 200 `text/event-stream`: hand the body off to the SSE reader. Carries
    /// the session id too — an `initialize` response can arrive as a
    /// stream, not only as inline JSON, and the header is on the response
    /// regardless of which shape the body takes.
    Sse {
        body: BodyStream<E>,
        session_id: Option<String>,
    },
    /// 401: defer to the Auth Coordinator.
    Unauthorized,
    /// 405 on the standalone/reconnect GET: the server has no listening
    /// stream. Swallowed silently by the caller, never surfaced as an
    /// error.
    ListeningStreamNotSupported,
    /// 405 on DELETE: the server does not implement session termination.
    /// Treated as a successful termination.
    DeleteNotImplemented,
}

pub async fn classify_response<E>(
    kind: RequestKind,
    response: HttpResponse<E>,
) -> Result<Classified<E>, TransportError<E>>
where
    E: std::error::Error + Send + Sync + 'static,
{
    // DELETE never carries a JSON-RPC body (spec §6.1): any 2xx is success,
    // without attempting to interpret a content type or body.
    if kind == RequestKind::Delete && response.status.is_success() {
        return Ok(Classified::Accepted);
    }

    match response.status {
        StatusCode::ACCEPTED => Ok(Classified::Accepted),
        StatusCode::OK => {
            let session_id = response
                .headers
                .get(SESSION_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            match content_type_media(&response.headers).as_deref() {
                None | Some("application/json") => {
                    let body = read_to_end(response.body).await?;
                    let payload: InboundPayload = serde_json::from_slice(&body)?;
                    Ok(Classified::Json {
                        messages: payload.into_messages(),
                        session_id,
                    })
                }
                Some("text/event-stream") => Ok(Classified::Sse {
                    body: response.body,
                    session_id,
                }),
                Some(other) => Err(TransportError::UnexpectedContentType(Some(
                    other.to_string(),
                ))),
            }
        }
        StatusCode::UNAUTHORIZED => Ok(Classified::Unauthorized),
        StatusCode::METHOD_NOT_ALLOWED => match kind {
            RequestKind::Get => Ok(Classified::ListeningStreamNotSupported),
            RequestKind::Delete => Ok(Classified::DeleteNotImplemented),
            RequestKind::Post => Err(http_error(kind, response.status, response.body).await),
        },
        other_status => {
            let _ = other_status;
            Err(http_error(kind, response.status, response.body).await)
        }
    }
}

fn method_for(kind: RequestKind) -> http::Method {
    match kind {
        RequestKind::Post => http::Method::POST,
        RequestKind::Get => http::Method::GET,
        RequestKind::Delete => http::Method::DELETE,
    }
}

async fn http_error<E>(
    kind: RequestKind,
    status: StatusCode,
    body: BodyStream<E>,
) -> TransportError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let snippet = read_to_end(body)
        .await
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
    TransportError::http(method_for(kind), status, snippet)
}

async fn read_to_end<E>(mut stream: BodyStream<E>) -> Result<Vec<u8>, TransportError<E>>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(TransportError::Client)?;
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// The media type only, lowercased, with any `;charset=...` parameters
/// stripped, matching case-insensitively per spec §4.2.
fn content_type_media(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
}
