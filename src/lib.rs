//! Client-side Streamable HTTP transport for the Model Context Protocol.
//!
//! Multiplexes JSON-RPC request/response, server-initiated notifications,
//! and resumable SSE streams over one HTTP endpoint. See
//! [`StreamableHttpClientTransport`] for the entry point.

#![forbid(unsafe_code)]

#[cfg(feature = "auth")]
pub mod auth;
pub mod config;
mod dispatcher;
pub mod error;
pub mod fetch;
pub mod headers;
pub mod message;
pub mod reconnect;
mod session;
mod sse;
pub mod transport;

pub use config::{RequestInit, TransportConfig};
pub use error::TransportError;
pub use fetch::{Fetch, HttpRequest, HttpResponse};
pub use message::{JsonRpcId, JsonRpcMessage, OutboundPayload};
pub use reconnect::ReconnectionOptions;
pub use transport::{CloseHandler, ErrorHandler, MessageHandler, StreamableHttpClientTransport, TransportBuilder};

#[cfg(feature = "__reqwest")]
pub use fetch::ReqwestFetch;
