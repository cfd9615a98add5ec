//! Host-facing plugin surface
//!
//! [`SsoPlugin`] is what a forum host wires into its extension points:
//!
//! | Host hook                 | Method                                   |
//! |---------------------------|------------------------------------------|
//! | get login strategies      | [`SsoPlugin::get_strategy`]              |
//! | parse provider profile    | [`SsoPlugin::parse_user_return`]         |
//! | log a user in             | [`SsoPlugin::login`]                     |
//! | delete user data          | [`SsoPlugin::delete_user_data`]          |
//! | whitelist user fields     | [`SsoPlugin::whitelist_fields`]          |
//!
//! A plugin built from an invalid configuration stays disabled: it logs the
//! [`ConfigError`] once, registers nothing and leaves user data alone.

use std::sync::Arc;

use crate::config::{ConfigError, ProviderConfig, SsoSettings};
use crate::error::SsoError;
use crate::host::{AuthRegistry, HostServices};
use crate::identity::{LocalAccountRef, LoginPayload};
use crate::lifecycle::{AccountHooks, WhitelistParams};
use crate::profile::{normalize_body, normalize_value, NormalizedProfile, ProfileNormalizer};
use crate::strategy::{Handshake, Registrar, StrategyDescriptor};

#[derive(Debug)]
struct Enabled {
    registrar: Registrar,
    hooks: AccountHooks,
}

/// The SSO adapter as seen by the host
#[derive(Debug)]
pub struct SsoPlugin {
    state: Result<Enabled, ConfigError>,
}

impl SsoPlugin {
    /// Resolve `settings` and build the plugin
    ///
    /// An invalid configuration is logged at error level and disables the
    /// plugin.
    #[must_use]
    pub fn new(settings: &SsoSettings, host: HostServices) -> Self {
        match settings.resolve() {
            Ok(config) => Self::from_config(config, host),
            Err(e) => {
                tracing::error!(
                    provider = %settings.oauth.name,
                    error = %e,
                    "OAuth provider disabled by invalid configuration"
                );
                Self { state: Err(e) }
            }
        }
    }

    /// Build the plugin from an already resolved configuration
    #[must_use]
    pub fn from_config(config: ProviderConfig, host: HostServices) -> Self {
        let config = Arc::new(config);
        Self {
            state: Ok(Enabled {
                hooks: AccountHooks::new(config.clone(), host.clone()),
                registrar: Registrar::new(config, host),
            }),
        }
    }

    /// Replace the profile normalizer
    #[must_use]
    pub fn with_normalizer(self, normalizer: Arc<dyn ProfileNormalizer>) -> Self {
        self.map_registrar(|registrar| registrar.with_normalizer(normalizer))
    }

    /// Replace the built-in handshake client
    #[must_use]
    pub fn with_handshake(self, handshake: Arc<dyn Handshake>) -> Self {
        self.map_registrar(|registrar| registrar.with_handshake(handshake))
    }

    fn map_registrar(self, f: impl FnOnce(Registrar) -> Registrar) -> Self {
        Self {
            state: self.state.map(|enabled| Enabled {
                registrar: f(enabled.registrar),
                hooks: enabled.hooks,
            }),
        }
    }

    /// Whether the configuration resolved
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.state.is_ok()
    }

    /// Resolved configuration, if enabled
    #[must_use]
    pub fn config(&self) -> Option<&ProviderConfig> {
        self.state
            .as_ref()
            .ok()
            .map(|enabled| enabled.registrar.config().as_ref())
    }

    /// Configuration error, if disabled
    #[must_use]
    pub fn config_error(&self) -> Option<&ConfigError> {
        self.state.as_ref().err()
    }

    fn enabled(&self) -> Result<&Enabled, ConfigError> {
        self.state.as_ref().map_err(Clone::clone)
    }

    /// Register the strategy with the host and append its descriptor
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] if the plugin is disabled or the strategy
    /// cannot be built; `strategies` is then left unextended.
    pub fn get_strategy(
        &self,
        strategies: Vec<StrategyDescriptor>,
        registry: &dyn AuthRegistry,
    ) -> Result<Vec<StrategyDescriptor>, ConfigError> {
        let enabled = self.enabled()?;
        enabled.registrar.register(strategies, registry).inspect_err(|e| {
            tracing::error!(
                provider = %enabled.registrar.config().name(),
                error = %e,
                "Failed to register authentication strategy"
            );
        })
    }

    /// Parse and normalize a raw user-info body
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Parse`] for malformed or incomplete profiles, or
    /// [`SsoError::Config`] if the plugin is disabled.
    pub fn parse_user_return(&self, body: &str) -> Result<NormalizedProfile, SsoError> {
        let registrar = &self.enabled()?.registrar;
        Ok(normalize_body(
            registrar.normalizer(),
            body,
            registrar.config().name(),
        )?)
    }

    /// Normalize an already parsed user-info response
    ///
    /// # Errors
    ///
    /// See [`parse_user_return`](Self::parse_user_return).
    pub fn parse_user_value(
        &self,
        raw: &serde_json::Value,
    ) -> Result<NormalizedProfile, SsoError> {
        let registrar = &self.enabled()?.registrar;
        Ok(normalize_value(
            registrar.normalizer(),
            raw,
            registrar.config().name(),
        )?)
    }

    /// Resolve a login payload to a local account
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Login`] if the account cannot be found, created or
    /// linked, or [`SsoError::Config`] if the plugin is disabled.
    pub async fn login(&self, payload: &LoginPayload) -> Result<LocalAccountRef, SsoError> {
        let registrar = &self.enabled()?.registrar;
        Ok(registrar.resolver().login(payload).await?)
    }

    /// Remove the identity mapping of `uid` before the host deletes the user
    ///
    /// A disabled plugin leaves user data alone.
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Host`] if the host cannot read or delete the data.
    pub async fn delete_user_data(&self, uid: u64) -> Result<(), SsoError> {
        match &self.state {
            Ok(enabled) => Ok(enabled.hooks.delete_user_data(uid).await?),
            Err(_) => Ok(()),
        }
    }

    /// Add `<name>Id` to the host's user field whitelist
    ///
    /// A disabled plugin returns `params` unchanged.
    #[must_use]
    pub fn whitelist_fields(&self, params: WhitelistParams) -> WhitelistParams {
        match &self.state {
            Ok(enabled) => enabled.hooks.whitelist_fields(params),
            Err(_) => params,
        }
    }
}
