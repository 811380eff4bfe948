//! Adapts a raw HTTP response body into a stream of parsed Server-Sent
//! Events. The line-oriented SSE grammar itself (line endings, `data:`
//! accumulation, UTF-8-safe chunk buffering) is `sse-stream`'s own concern —
//! the crate this transport already depends on for exactly this, the same
//! way `SseStream::from_byte_stream` turns an upstream response body into a
//! `Stream<Item = Result<Sse, Error>>` in the pack's own MCP-over-HTTP
//! clients (e.g. agentgateway's `streamablehttp.rs`/`session.rs`).

use futures::stream::BoxStream;
use futures::StreamExt;
use sse_stream::{Error as SseError, Sse, SseStream};

use crate::fetch::BodyStream;

/// Wraps a response body in the SSE Stream Reader (spec §4.3): a boxed
/// stream of parsed events, ready for the Resumption Manager to consume.
pub fn decode_sse_stream<E>(
    body_stream: BodyStream<E>,
) -> BoxStream<'static, Result<Sse, SseError>>
where
    E: std::error::Error + Send + Sync + 'static,
{
    SseStream::from_byte_stream(body_stream).boxed()
}
