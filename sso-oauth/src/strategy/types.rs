//! Handshake types
//!
//! The protocol handshake (request signing, token exchange, redirects) is done
//! by a [`Handshake`] implementation. Both protocol versions are built in
//! ([`super::oauth1::OAuth1Handshake`], [`super::oauth2::OAuth2Handshake`]); an
//! integrator can supply their own.

use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StrategyKind;

/// Handshake errors
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The user or provider refused authorization
    #[error("Provider denied authorization: {0}")]
    ProviderDenied(String),

    /// A required callback parameter is absent
    #[error("Missing callback parameter `{0}`")]
    MissingParameter(&'static str),

    /// Callback `state` does not match the pending request
    #[error("Callback state does not match the pending authorization")]
    StateMismatch,

    /// Token exchange failed
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// Protected resource request failed
    #[error("Failed to fetch user info: {0}")]
    UserInfoFailed(String),

    /// The grant was issued for the other protocol version
    #[error("Handshake cannot use a {0} grant")]
    UnsupportedGrant(StrategyKind),

    /// Client construction or other handshake failure
    #[error("Invalid handshake: {0}")]
    Invalid(String),
}

/// Credentials obtained by a completed handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AccessGrant {
    /// OAuth 1.0a token credentials
    #[serde(rename = "oauth")]
    OAuth1 {
        /// Token
        token: String,
        /// Token secret
        token_secret: String,
    },
    /// OAuth 2.0 access token
    #[serde(rename = "oauth2")]
    OAuth2 {
        /// Access token
        access_token: String,
        /// Refresh token (if provided)
        #[serde(skip_serializing_if = "Option::is_none")]
        refresh_token: Option<String>,
        /// When the token expires
        #[serde(skip_serializing_if = "Option::is_none")]
        expires_at: Option<SystemTime>,
        /// Scopes granted
        #[serde(skip_serializing_if = "Option::is_none")]
        scopes: Option<Vec<String>>,
    },
}

impl AccessGrant {
    /// Protocol version that issued the grant
    #[must_use]
    pub const fn kind(&self) -> StrategyKind {
        match self {
            Self::OAuth1 { .. } => StrategyKind::OAuth1,
            Self::OAuth2 { .. } => StrategyKind::OAuth2,
        }
    }
}

/// Authorization request started by [`Handshake::begin`]
///
/// The host keeps this in the user's session until the callback arrives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Where to redirect the user
    pub url: String,
    /// OAuth 2.0 CSRF state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// OAuth 2.0 PKCE verifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkce_verifier: Option<String>,
    /// OAuth 1.0a request token secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_token_secret: Option<String>,
}

/// Query parameters received on `/auth/<name>/callback`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackParams {
    /// OAuth 2.0 authorization code
    pub code: Option<String>,
    /// OAuth 2.0 state
    pub state: Option<String>,
    /// OAuth 1.0a request token
    pub oauth_token: Option<String>,
    /// OAuth 1.0a verifier
    pub oauth_verifier: Option<String>,
    /// Provider error code
    pub error: Option<String>,
    /// Provider error description
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Provider-reported error, if any
    #[must_use]
    pub fn denial(&self) -> Option<String> {
        self.error.as_ref().map(|error| {
            self.error_description
                .as_ref()
                .map_or_else(|| error.clone(), |description| format!("{error}: {description}"))
        })
    }
}

/// Protocol handshake with the provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Handshake: Send + Sync {
    /// Protocol version spoken by this client
    fn kind(&self) -> StrategyKind;

    /// Start an authorization and return where to send the user
    async fn begin(&self, scope: &[String]) -> Result<AuthorizationRequest, HandshakeError>;

    /// Finish the authorization from the callback parameters
    async fn complete(
        &self,
        callback: &CallbackParams,
        pending: &AuthorizationRequest,
    ) -> Result<AccessGrant, HandshakeError>;

    /// GET a protected resource and return the response body
    async fn get_protected(&self, url: &str, grant: &AccessGrant)
        -> Result<String, HandshakeError>;
}
