//! The pluggable HTTP performer (spec §6.2): the integration point for
//! custom auth, proxying, or instrumentation. Defaults to a `reqwest`-backed
//! implementation behind the `reqwest` feature.

use std::future::Future;

use bytes::Bytes;
use futures::stream::BoxStream;
use http::{HeaderMap, Method, StatusCode};
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

pub type BodyStream<E> = BoxStream<'static, Result<Bytes, E>>;

pub struct HttpResponse<E: std::error::Error + Send + Sync + 'static> {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream<E>,
}

/// A client-agnostic HTTP performer. Generalizes the teacher's
/// `StreamableHttpClient` trait (three specialized methods —
/// `post_message`/`delete_session`/`get_stream`) down to the single
/// `(url, init) -> response` signature spec §6.2 requires, since this
/// transport's Request Dispatcher (not the `Fetch` implementor) is what
/// decides verb, headers, and response classification.
pub trait Fetch: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse<Self::Error>, Self::Error>> + Send;
}

#[cfg(feature = "__reqwest")]
mod reqwest_impl {
    use super::*;
    use futures::StreamExt;

    /// The default [`Fetch`] implementation, backed by a shared
    /// `reqwest::Client` (connection pooling, TLS, redirects all come from
    /// `reqwest` itself — the same default the teacher's `reqwest` feature
    /// provides for its own transports).
    #[derive(Debug, Clone, Default)]
    pub struct ReqwestFetch {
        client: reqwest::Client,
    }

    impl ReqwestFetch {
        pub fn new(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    impl Fetch for ReqwestFetch {
        type Error = reqwest::Error;

        async fn execute(
            &self,
            request: HttpRequest,
        ) -> Result<HttpResponse<Self::Error>, Self::Error> {
            let mut builder = self.client.request(request.method, request.url);
            builder = builder.headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes_stream().boxed();
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}

#[cfg(feature = "__reqwest")]
pub use reqwest_impl::ReqwestFetch;
