use std::sync::{Arc, RwLock};

use http::HeaderMap;
use url::Url;

#[cfg(feature = "auth")]
use crate::auth::AuthProvider;
use crate::reconnect::ReconnectionOptions;

/// A template for per-request options, notably headers. The transport never
/// mutates this itself (spec §6.4); a caller who wants to change headers
/// after construction does so through the [`Arc<RwLock<HeaderMap>>`] handle
/// returned by [`RequestInit::headers_handle`], and the transport re-reads
/// it fresh on every send (Invariant 4).
#[derive(Clone)]
pub struct RequestInit {
    headers: Arc<RwLock<HeaderMap>>,
}

impl Default for RequestInit {
    fn default() -> Self {
        Self {
            headers: Arc::new(RwLock::new(HeaderMap::new())),
        }
    }
}

impl RequestInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(headers: HeaderMap) -> Self {
        Self {
            headers: Arc::new(RwLock::new(headers)),
        }
    }

    /// A shared handle the caller can mutate at any time; the next send
    /// re-reads through it.
    pub fn headers_handle(&self) -> Arc<RwLock<HeaderMap>> {
        self.headers.clone()
    }

    pub(crate) fn snapshot_headers(&self) -> HeaderMap {
        self.headers
            .read()
            .expect("request init headers lock poisoned")
            .clone()
    }
}

/// Construction options (spec §6.4): `{ authProvider?, fetch?, requestInit?,
/// reconnectionOptions? }`. `fetch` itself is supplied separately as the
/// transport's `F: Fetch` type parameter rather than stored here, since it
/// is chosen at the type level, not swapped at runtime.
#[derive(Clone)]
pub struct TransportConfig {
    pub endpoint: Url,
    pub request_init: RequestInit,
    pub reconnection_options: ReconnectionOptions,
    #[cfg(feature = "auth")]
    pub auth_provider: Option<Arc<dyn AuthProvider>>,
}

impl TransportConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            request_init: RequestInit::default(),
            reconnection_options: ReconnectionOptions::default(),
            #[cfg(feature = "auth")]
            auth_provider: None,
        }
    }

    pub fn with_request_init(mut self, request_init: RequestInit) -> Self {
        self.request_init = request_init;
        self
    }

    pub fn with_reconnection_options(mut self, options: ReconnectionOptions) -> Self {
        self.reconnection_options = options;
        self
    }

    #[cfg(feature = "auth")]
    pub fn with_auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth_provider = Some(provider);
        self
    }

    #[cfg(feature = "auth")]
    pub(crate) fn cached_auth_token(&self) -> Option<String> {
        self.auth_provider
            .as_ref()
            .and_then(|provider| provider.tokens())
            .map(|tokens| tokens.access_token)
    }

    #[cfg(not(feature = "auth"))]
    pub(crate) fn cached_auth_token(&self) -> Option<String> {
        None
    }
}
