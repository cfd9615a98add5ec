//! Fetch-profile capability
//!
//! A [`ProfileFetcher`] is handed to each [`super::Strategy`] at construction.
//! The default [`UserInfoFetcher`] GETs the configured user-info URL through the
//! handshake and runs the body through the profile normalizer.

use std::sync::Arc;

use async_trait::async_trait;

use super::types::{AccessGrant, Handshake};
use crate::error::SsoError;
use crate::profile::{normalize_body, NormalizedProfile, ProfileNormalizer};

/// Loads the normalized profile of the user a grant belongs to
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    /// Fetch and normalize the profile
    async fn fetch_profile(&self, grant: &AccessGrant) -> Result<NormalizedProfile, SsoError>;
}

/// Default fetcher: user-info endpoint plus normalizer
pub struct UserInfoFetcher {
    handshake: Arc<dyn Handshake>,
    normalizer: Arc<dyn ProfileNormalizer>,
    user_info_url: String,
    provider: String,
}

impl std::fmt::Debug for UserInfoFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserInfoFetcher")
            .field("user_info_url", &self.user_info_url)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl UserInfoFetcher {
    /// Create a fetcher for `provider`
    pub fn new(
        handshake: Arc<dyn Handshake>,
        normalizer: Arc<dyn ProfileNormalizer>,
        user_info_url: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            handshake,
            normalizer,
            user_info_url: user_info_url.into(),
            provider: provider.into(),
        }
    }
}

#[async_trait]
impl ProfileFetcher for UserInfoFetcher {
    async fn fetch_profile(&self, grant: &AccessGrant) -> Result<NormalizedProfile, SsoError> {
        let body = self
            .handshake
            .get_protected(&self.user_info_url, grant)
            .await?;

        let profile = normalize_body(self.normalizer.as_ref(), &body, &self.provider)?;

        tracing::debug!(
            provider = %self.provider,
            external_id = %profile.external_id,
            "Fetched provider profile"
        );
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{EnvelopeNormalizer, ParseError};
    use crate::strategy::types::{HandshakeError, MockHandshake};

    fn grant() -> AccessGrant {
        AccessGrant::OAuth1 {
            token: "token".to_string(),
            token_secret: "secret".to_string(),
        }
    }

    fn fetcher(handshake: MockHandshake) -> UserInfoFetcher {
        UserInfoFetcher::new(
            Arc::new(handshake),
            Arc::new(EnvelopeNormalizer::new()),
            "https://wiki.example.org/w/api.php",
            "wiki",
        )
    }

    #[tokio::test]
    async fn test_fetches_and_normalizes() {
        let mut handshake = MockHandshake::new();
        handshake
            .expect_get_protected()
            .withf(|url, _| url == "https://wiki.example.org/w/api.php")
            .returning(|_, _| {
                Ok(r#"{"query":{"userinfo":{"id":42,"name":"Alice","email":"a@x.com"}}}"#
                    .to_string())
            });

        let profile = fetcher(handshake).fetch_profile(&grant()).await.unwrap();
        assert_eq!(profile.external_id, "42");
        assert_eq!(profile.provider, "wiki");
    }

    #[tokio::test]
    async fn test_handshake_failure_propagates() {
        let mut handshake = MockHandshake::new();
        handshake
            .expect_get_protected()
            .returning(|_, _| Err(HandshakeError::UserInfoFailed("HTTP 500".to_string())));

        let err = fetcher(handshake).fetch_profile(&grant()).await.unwrap_err();
        assert!(matches!(err, SsoError::Handshake(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let mut handshake = MockHandshake::new();
        handshake
            .expect_get_protected()
            .returning(|_, _| Ok("<html>".to_string()));

        let err = fetcher(handshake).fetch_profile(&grant()).await.unwrap_err();
        assert!(matches!(err, SsoError::Parse(ParseError::InvalidJson(_))));
    }
}
