//! Authentication strategies
//!
//! A [`Strategy`] bundles everything the host needs for one provider: the
//! handshake client, the fetch-profile capability, identity resolution and the
//! host's login hook. The [`Registrar`] builds it from a [`ProviderConfig`] and
//! registers it with the host's [`AuthRegistry`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sso_oauth::prelude::*;
//!
//! # fn example() -> Result<(), SsoError> {
//! let settings = SsoSettings::from_toml_str(
//!     r#"
//!     url = "https://forum.example.org"
//!
//!     [oauth]
//!     type = "oauth2"
//!     name = "acme"
//!     key = "client-id"
//!     secret = "client-secret"
//!     authorize_url = "https://id.example.com/authorize"
//!     token_url = "https://id.example.com/token"
//!     user_info_url = "https://id.example.com/userinfo"
//!     "#,
//! )?;
//! let config = Arc::new(settings.resolve()?);
//!
//! let host = MemoryHost::new();
//! let registrar = Registrar::new(config, HostServices::from_host(Arc::new(host.clone())));
//! let strategies = registrar.register(Vec::new(), &host)?;
//! assert_eq!(strategies[0].url, "/auth/acme");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ProviderConfig, StrategyKind};
use crate::error::SsoError;
use crate::host::{AuthRegistry, HostServices, LoginNotifier};
use crate::identity::{IdentityResolver, LocalAccountRef, LoginPayload};
use crate::profile::{EnvelopeNormalizer, ProfileNormalizer};

pub mod fetch;
pub mod oauth1;
pub mod oauth2;
pub mod types;

pub use self::fetch::{ProfileFetcher, UserInfoFetcher};
pub use self::oauth1::OAuth1Handshake;
pub use self::oauth2::OAuth2Handshake;
pub use self::types::{AccessGrant, AuthorizationRequest, CallbackParams, Handshake, HandshakeError};

/// HTTP client for provider token endpoints, which must not be redirected
pub(crate) fn token_endpoint_client() -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// Login button and routes the host shows for a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDescriptor {
    /// Provider name
    pub name: String,
    /// Login route, `/auth/<name>`
    pub url: String,
    /// Callback route, `/auth/<name>/callback`
    pub callback_url: String,
    /// Icon class
    pub icon: String,
    /// Requested scopes
    pub scope: Vec<String>,
}

impl StrategyDescriptor {
    /// Describe the strategy for `config`
    #[must_use]
    pub fn for_config(config: &ProviderConfig) -> Self {
        let name = config.name();
        Self {
            name: name.to_string(),
            url: format!("/auth/{name}"),
            callback_url: format!("/auth/{name}/callback"),
            icon: config.icon().to_string(),
            scope: config.scope().to_vec(),
        }
    }
}

/// A registered authentication strategy
pub struct Strategy {
    config: Arc<ProviderConfig>,
    handshake: Arc<dyn Handshake>,
    fetcher: Arc<dyn ProfileFetcher>,
    resolver: IdentityResolver,
    notifier: Arc<dyn LoginNotifier>,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("name", &self.config.name())
            .field("kind", &self.config.kind())
            .finish_non_exhaustive()
    }
}

impl Strategy {
    /// Assemble a strategy from its parts
    #[must_use]
    pub fn new(
        config: Arc<ProviderConfig>,
        handshake: Arc<dyn Handshake>,
        fetcher: Arc<dyn ProfileFetcher>,
        resolver: IdentityResolver,
        notifier: Arc<dyn LoginNotifier>,
    ) -> Self {
        Self {
            config,
            handshake,
            fetcher,
            resolver,
            notifier,
        }
    }

    /// Provider name
    #[must_use]
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Protocol version
    #[must_use]
    pub fn kind(&self) -> StrategyKind {
        self.config.kind()
    }

    /// Routes and button data for the host
    #[must_use]
    pub fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor::for_config(&self.config)
    }

    /// Start the handshake
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Handshake`] if the provider cannot be reached.
    pub async fn begin(&self) -> Result<AuthorizationRequest, SsoError> {
        Ok(self.handshake.begin(self.config.scope()).await?)
    }

    /// Finish the handshake from the callback request
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Handshake`] if the provider denied access, the
    /// callback does not match `pending`, or the token exchange fails.
    pub async fn complete(
        &self,
        callback: &CallbackParams,
        pending: &AuthorizationRequest,
    ) -> Result<AccessGrant, SsoError> {
        Ok(self.handshake.complete(callback, pending).await?)
    }

    /// Handshake success callback: resolve the grant to a local account
    ///
    /// Fetches and normalizes the profile, resolves or creates the account,
    /// then fires the host's successful-login hook.
    ///
    /// # Errors
    ///
    /// Any failure is returned; the host reports it to the user as a generic
    /// authentication failure.
    pub async fn authenticate(&self, grant: &AccessGrant) -> Result<LocalAccountRef, SsoError> {
        let result = self.resolve_grant(grant).await;

        match &result {
            Ok(account) => tracing::info!(
                provider = %self.name(),
                uid = account.uid,
                "Login succeeded"
            ),
            Err(e) => tracing::warn!(
                provider = %self.name(),
                error = %e,
                kind = e.kind(),
                "Login failed"
            ),
        }

        result
    }

    /// [`complete`](Self::complete) followed by [`authenticate`](Self::authenticate)
    ///
    /// # Errors
    ///
    /// Returns the first failure of either step.
    pub async fn handle_callback(
        &self,
        callback: &CallbackParams,
        pending: &AuthorizationRequest,
    ) -> Result<LocalAccountRef, SsoError> {
        let grant = self.complete(callback, pending).await?;
        self.authenticate(&grant).await
    }

    async fn resolve_grant(&self, grant: &AccessGrant) -> Result<LocalAccountRef, SsoError> {
        let profile = self.fetcher.fetch_profile(grant).await?;
        let payload = LoginPayload::from_profile(&profile)?;
        let account = self.resolver.login(&payload).await?;
        self.notifier.on_successful_login(account.uid).await?;
        Ok(account)
    }
}

/// Builds strategies from a provider configuration and registers them
pub struct Registrar {
    config: Arc<ProviderConfig>,
    host: HostServices,
    resolver: IdentityResolver,
    normalizer: Arc<dyn ProfileNormalizer>,
    handshake: Option<Arc<dyn Handshake>>,
}

impl std::fmt::Debug for Registrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("config", &self.config)
            .field("custom_handshake", &self.handshake.is_some())
            .finish_non_exhaustive()
    }
}

impl Registrar {
    /// Create a registrar with the default normalizer
    ///
    /// The default normalizer honours the configured admin claim.
    #[must_use]
    pub fn new(config: Arc<ProviderConfig>, host: HostServices) -> Self {
        let normalizer = config.admin_claim().map_or_else(
            EnvelopeNormalizer::new,
            |claim| EnvelopeNormalizer::new().with_admin_claim(claim),
        );

        Self {
            resolver: IdentityResolver::new(config.clone(), host.clone()),
            config,
            host,
            normalizer: Arc::new(normalizer),
            handshake: None,
        }
    }

    /// Replace the profile normalizer
    #[must_use]
    pub fn with_normalizer(mut self, normalizer: Arc<dyn ProfileNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Replace the built-in handshake client
    #[must_use]
    pub fn with_handshake(mut self, handshake: Arc<dyn Handshake>) -> Self {
        self.handshake = Some(handshake);
        self
    }

    /// Provider configuration
    #[must_use]
    pub const fn config(&self) -> &Arc<ProviderConfig> {
        &self.config
    }

    /// Identity resolver shared by every strategy built here
    #[must_use]
    pub const fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Profile normalizer in use
    #[must_use]
    pub fn normalizer(&self) -> &dyn ProfileNormalizer {
        self.normalizer.as_ref()
    }

    /// Build the strategy without registering it
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HandshakeKindMismatch`] if a supplied client
    /// speaks the other protocol version, or the error from building the
    /// built-in client.
    pub fn build_strategy(&self) -> Result<Strategy, ConfigError> {
        let handshake: Arc<dyn Handshake> = match (&self.handshake, self.config.kind()) {
            (Some(handshake), kind) if handshake.kind() != kind => {
                return Err(ConfigError::HandshakeKindMismatch {
                    expected: kind,
                    actual: handshake.kind(),
                });
            }
            (Some(handshake), _) => handshake.clone(),
            (None, StrategyKind::OAuth1) => Arc::new(OAuth1Handshake::new(&self.config)?),
            (None, StrategyKind::OAuth2) => Arc::new(OAuth2Handshake::new(&self.config)?),
        };

        let fetcher = UserInfoFetcher::new(
            handshake.clone(),
            self.normalizer.clone(),
            self.config.user_info_url(),
            self.config.name(),
        );

        Ok(Strategy::new(
            self.config.clone(),
            handshake,
            Arc::new(fetcher),
            self.resolver.clone(),
            self.host.notifier.clone(),
        ))
    }

    /// Register the strategy with the host and append its descriptor
    ///
    /// On error nothing is registered and `strategies` is not extended.
    ///
    /// # Errors
    ///
    /// See [`build_strategy`](Self::build_strategy).
    pub fn register(
        &self,
        mut strategies: Vec<StrategyDescriptor>,
        registry: &dyn AuthRegistry,
    ) -> Result<Vec<StrategyDescriptor>, ConfigError> {
        let strategy = Arc::new(self.build_strategy()?);
        let descriptor = strategy.descriptor();

        registry.use_strategy(strategy);
        tracing::info!(
            provider = %descriptor.name,
            kind = %self.config.kind(),
            url = %descriptor.url,
            "Registered authentication strategy"
        );

        strategies.push(descriptor);
        Ok(strategies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SsoSettings;
    use crate::host::{MemoryHost, MockAuthRegistry};
    use crate::profile::{NormalizedProfile, ParseError, ProfileEmail};
    use crate::strategy::fetch::MockProfileFetcher;
    use crate::strategy::types::MockHandshake;

    fn wiki_config() -> Arc<ProviderConfig> {
        let mut settings = SsoSettings::default();
        settings.url = "https://forum.example.org".to_string();
        settings.oauth.key = Some("consumer".to_string());
        settings.oauth.secret = Some("secret".to_string());
        settings.oauth.scope = Some("basic,email".to_string());
        Arc::new(settings.resolve().unwrap())
    }

    fn oauth1_handshake() -> MockHandshake {
        let mut handshake = MockHandshake::new();
        handshake.expect_kind().return_const(StrategyKind::OAuth1);
        handshake
    }

    fn grant() -> AccessGrant {
        AccessGrant::OAuth1 {
            token: "token".to_string(),
            token_secret: "secret".to_string(),
        }
    }

    fn profile(id: &str, name: &str, email: &str) -> NormalizedProfile {
        NormalizedProfile {
            external_id: id.to_string(),
            display_name: name.to_string(),
            emails: vec![ProfileEmail::new(email)],
            is_admin: false,
            provider: "wiki".to_string(),
        }
    }

    #[test]
    fn test_descriptor_routes() {
        let descriptor = StrategyDescriptor::for_config(&wiki_config());

        assert_eq!(descriptor.name, "wiki");
        assert_eq!(descriptor.url, "/auth/wiki");
        assert_eq!(descriptor.callback_url, "/auth/wiki/callback");
        assert_eq!(descriptor.icon, "fa-wikipedia-w");
        assert_eq!(descriptor.scope, ["basic", "email"]);

        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["callbackUrl"], "/auth/wiki/callback");
    }

    #[test]
    fn test_register_appends_descriptor() {
        let host = MemoryHost::new();
        let registrar = Registrar::new(
            wiki_config(),
            HostServices::from_host(Arc::new(host.clone())),
        )
        .with_handshake(Arc::new(oauth1_handshake()));

        let existing = StrategyDescriptor {
            name: "local".to_string(),
            url: "/auth/local".to_string(),
            callback_url: "/auth/local/callback".to_string(),
            icon: String::new(),
            scope: vec![],
        };

        let strategies = registrar.register(vec![existing], &host).unwrap();
        assert_eq!(strategies.len(), 2);
        assert_eq!(strategies[1].name, "wiki");
        assert!(host.strategy("wiki").is_some());
    }

    #[test]
    fn test_oauth1_uses_builtin_handshake() {
        let host = MemoryHost::new();
        let registrar =
            Registrar::new(wiki_config(), HostServices::from_host(Arc::new(host.clone())));

        let mut registry = MockAuthRegistry::new();
        registry
            .expect_use_strategy()
            .withf(|strategy| strategy.kind() == StrategyKind::OAuth1)
            .times(1)
            .return_const(());

        let strategies = registrar.register(Vec::new(), &registry).unwrap();
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].url, "/auth/wiki");
    }

    #[test]
    fn test_handshake_kind_mismatch() {
        let host = MemoryHost::new();
        let mut handshake = MockHandshake::new();
        handshake.expect_kind().return_const(StrategyKind::OAuth2);

        let registrar = Registrar::new(wiki_config(), HostServices::from_host(Arc::new(host)))
            .with_handshake(Arc::new(handshake));

        assert_eq!(
            registrar.build_strategy().unwrap_err(),
            ConfigError::HandshakeKindMismatch {
                expected: StrategyKind::OAuth1,
                actual: StrategyKind::OAuth2,
            }
        );
    }

    #[tokio::test]
    async fn test_authenticate_logs_in_and_notifies() {
        let host = MemoryHost::new();
        let services = HostServices::from_host(Arc::new(host.clone()));
        let config = wiki_config();

        let mut fetcher = MockProfileFetcher::new();
        fetcher
            .expect_fetch_profile()
            .returning(|_| Ok(profile("w123", "alice", "a@x.com")));

        let strategy = Strategy::new(
            config.clone(),
            Arc::new(oauth1_handshake()),
            Arc::new(fetcher),
            IdentityResolver::new(config, services.clone()),
            services.notifier.clone(),
        );

        let first = strategy.authenticate(&grant()).await.unwrap();
        let second = strategy.authenticate(&grant()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(host.user_count().await, 1);
        assert_eq!(host.logins().await, vec![first.uid, first.uid]);
    }

    #[tokio::test]
    async fn test_authenticate_parse_failure_creates_nothing() {
        let host = MemoryHost::new();
        let services = HostServices::from_host(Arc::new(host.clone()));
        let config = wiki_config();

        let mut fetcher = MockProfileFetcher::new();
        fetcher
            .expect_fetch_profile()
            .returning(|_| Err(ParseError::MissingField("id".to_string()).into()));

        let strategy = Strategy::new(
            config.clone(),
            Arc::new(oauth1_handshake()),
            Arc::new(fetcher),
            IdentityResolver::new(config, services.clone()),
            services.notifier.clone(),
        );

        let err = strategy.authenticate(&grant()).await.unwrap_err();
        assert!(matches!(err, SsoError::Parse(ParseError::MissingField(_))));
        assert_eq!(host.user_count().await, 0);
        assert!(host.logins().await.is_empty());
    }

    #[tokio::test]
    async fn test_begin_passes_configured_scope() {
        let host = MemoryHost::new();
        let mut handshake = oauth1_handshake();
        handshake
            .expect_begin()
            .withf(|scope| scope == ["basic".to_string(), "email".to_string()])
            .returning(|_| {
                Ok(AuthorizationRequest {
                    url: "https://en.wikipedia.org/w/index.php?title=Special:OAuth/authorize"
                        .to_string(),
                    request_token_secret: Some("rts".to_string()),
                    ..AuthorizationRequest::default()
                })
            });

        let registrar = Registrar::new(wiki_config(), HostServices::from_host(Arc::new(host)))
            .with_handshake(Arc::new(handshake));
        let strategy = registrar.build_strategy().unwrap();

        let request = strategy.begin().await.unwrap();
        assert_eq!(request.request_token_secret.as_deref(), Some("rts"));
    }
}
