//! The pluggable auth provider (spec §6.3). The transport never inspects
//! token internals beyond `access_token`; persistence, the OAuth client
//! registration dance, and the user-facing redirect are the provider's job.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The token record the provider hands back. Field names mirror
/// `oauth2::basic::BasicTokenResponse` so a provider built on top of the
/// `oauth2` crate (this crate's `auth` feature dependency, matching the
/// teacher's own `auth` feature) can convert one into the other without a
/// translation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// The client's registered identity with the authorization server, used
/// when attempting a refresh.
#[derive(Debug, Clone)]
pub struct ClientInformation {
    pub client_id: String,
    pub client_secret: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credentials available to refresh silently; user interaction is required")]
    InteractionRequired,
    #[error("token refresh request failed: {0}")]
    RefreshFailed(String),
}

/// Capability interface for driving the OAuth dance from behind a 401.
/// Stored as `Arc<dyn AuthProvider>` in `TransportConfig`, so it is defined
/// with `async-trait` (the teacher's own dependency for exactly this kind
/// of dyn-compatible async trait) rather than the return-position-impl-trait
/// style used for the non-object-safe `Fetch` trait.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// The current cached token, if any, without attempting a network
    /// refresh. Used by the Header Composer on every request.
    fn tokens(&self) -> Option<OAuthTokens>;

    fn client_information(&self) -> Option<ClientInformation>;

    async fn save_tokens(&self, tokens: OAuthTokens);

    async fn save_code_verifier(&self, verifier: String);

    async fn code_verifier(&self) -> Option<String>;

    /// Triggers the out-of-band user consent redirect. Called when a
    /// silent refresh is not possible.
    fn redirect_to_authorization(&self);

    fn redirect_url(&self) -> &str;

    fn client_metadata(&self) -> &Value;

    /// Attempt a silent refresh/acquisition of a fresh token (e.g. via a
    /// stored refresh token). `Ok(Some(_))` means the caller should retry
    /// the original request once with the new token. `Ok(None)` means no
    /// refresh credentials were available; the provider has (or will)
    /// invoke [`AuthProvider::redirect_to_authorization`] and the caller
    /// must surface `Unauthorized`.
    async fn refresh(&self) -> Result<Option<OAuthTokens>, AuthError>;
}
