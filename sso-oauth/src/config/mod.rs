//! Configuration management for sso-oauth
//!
//! Provider settings are loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `SSO_` prefix, `__` for nesting)
//! 2. `./config.toml` or an explicitly given file
//! 3. `~/.config/sso-oauth/config.toml` (user config, XDG)
//! 4. Hardcoded defaults (fallback)
//!
//! Never put your OAuth key/secret or OAuth 2.0 id/secret pair in code. Keep them
//! in the config file or in the environment:
//!
//! ```toml
//! # config.toml
//! url = "https://forum.example.org"
//!
//! [oauth]
//! root = "https://wiki.example.org/w/"
//! type = "oauth"
//! name = "wiki"
//! key = "someoauthid"
//! secret = "youroauthsecret"
//! scope = "basic,email"
//! ```
//!
//! ```text
//! SSO_OAUTH__KEY=someoauthid SSO_OAUTH__SECRET=youroauthsecret forum-server
//! ```
//!
//! Loaded settings are turned into an immutable [`ProviderConfig`] by
//! [`SsoSettings::resolve`]. An invalid configuration disables the provider.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use oauth2::url::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default provider root (`MediaWiki` script path)
pub const DEFAULT_ROOT: &str = "https://en.wikipedia.org/w/";

/// Default provider name
pub const DEFAULT_NAME: &str = "wiki";

/// Default public URL of the host forum
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:4567";

/// Default icon shown next to the login button
pub const DEFAULT_ICON: &str = "fa-wikipedia-w";

const REQUEST_TOKEN_PATH: &str = "index.php?title=Special:OAuth/initiate";
const ACCESS_TOKEN_PATH: &str = "index.php?title=Special:OAuth/token";
const AUTHORIZE_PATH: &str = "index.php?title=Special:OAuth/authorize";
const USER_INFO_PATH: &str = "api.php?action=query&meta=userinfo&uiprop=email&format=json";

/// Configuration errors
///
/// Any of these disables the provider: nothing is registered with the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The provider has no name
    #[error("Please specify a name for your OAuth provider")]
    MissingName,

    /// The strategy type is neither `oauth` nor `oauth2`
    #[error("Please specify an OAuth strategy to utilise (got `{0}`)")]
    UnsupportedStrategy(String),

    /// No user-info endpoint could be determined
    #[error("User Route required")]
    MissingUserRoute,

    /// A handshake endpoint required by the strategy is missing
    #[error("Missing `{0}` for the configured OAuth strategy")]
    MissingEndpoint(&'static str),

    /// Client credentials are incomplete
    #[error("Missing OAuth credential `{0}`")]
    MissingCredential(&'static str),

    /// A configured URL does not parse
    #[error("Invalid URL for `{field}`: {reason}")]
    InvalidUrl {
        /// Setting the URL came from
        field: &'static str,
        /// Parser message
        reason: String,
    },

    /// The handshake HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    /// A supplied handshake client speaks the wrong protocol version
    #[error("Handshake client speaks {actual}, provider is configured for {expected}")]
    HandshakeKindMismatch {
        /// Strategy kind from configuration
        expected: StrategyKind,
        /// Strategy kind of the supplied client
        actual: StrategyKind,
    },

    /// Configuration sources could not be read or merged
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// OAuth protocol version used by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    /// OAuth 1.0a
    #[serde(rename = "oauth")]
    OAuth1,
    /// OAuth 2.0
    #[serde(rename = "oauth2")]
    OAuth2,
}

impl StrategyKind {
    /// Get the strategy type as it appears in configuration
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OAuth1 => "oauth",
            Self::OAuth2 => "oauth2",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oauth" | "oauth1" => Ok(Self::OAuth1),
            "oauth2" => Ok(Self::OAuth2),
            _ => Err(ConfigError::UnsupportedStrategy(s.to_string())),
        }
    }
}

/// What happens when an admin-flagged login cannot join the administrators group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminGrantPolicy {
    /// The group join failure fails the login
    #[default]
    Required,
    /// The failure is logged and the login still succeeds
    BestEffort,
}

/// Raw `[oauth]` settings as read from configuration sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    /// Provider root URL; `MediaWiki` endpoints are derived from it
    pub root: String,

    /// Strategy type: `oauth` (1.0a) or `oauth2`
    #[serde(rename = "type")]
    pub strategy: String,

    /// Provider name, used in routes and persisted keys
    pub name: String,

    /// Consumer key (OAuth 1.0a) or client id (OAuth 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Consumer secret (OAuth 1.0a) or client secret (OAuth 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Comma-separated scope list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// OAuth 1.0a request-token endpoint override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_token_url: Option<String>,

    /// OAuth 1.0a access-token endpoint override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_url: Option<String>,

    /// Authorization endpoint (override for OAuth 1.0a, required for OAuth 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorize_url: Option<String>,

    /// OAuth 2.0 token endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,

    /// User-info endpoint override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info_url: Option<String>,

    /// Icon class for the login button
    pub icon: String,

    /// Profile key whose truthy value marks the user as an administrator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_claim: Option<String>,

    /// Failure handling for the administrators group join
    pub admin_grant: AdminGrantPolicy,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            strategy: StrategyKind::OAuth1.as_str().to_string(),
            name: DEFAULT_NAME.to_string(),
            key: None,
            secret: None,
            scope: None,
            request_token_url: None,
            access_token_url: None,
            authorize_url: None,
            token_url: None,
            user_info_url: None,
            icon: DEFAULT_ICON.to_string(),
            admin_claim: None,
            admin_grant: AdminGrantPolicy::default(),
        }
    }
}

/// Complete sso-oauth settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SsoSettings {
    /// Public URL of the host forum, used to build the callback URL
    pub url: String,

    /// Provider settings
    pub oauth: OAuthSettings,
}

impl Default for SsoSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_PUBLIC_URL.to_string(),
            oauth: OAuthSettings::default(),
        }
    }
}

impl SsoSettings {
    /// Load settings from the standard locations
    ///
    /// Precedence (highest first): `SSO_*` environment variables,
    /// `./config.toml`, `~/.config/sso-oauth/config.toml`, defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a source cannot be read or the merged
    /// values do not deserialize.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Self::defaults()?;

        let user_config = Self::recommended_path();
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }

        let local_config = PathBuf::from("./config.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        Self::extract(&figment.merge(Self::env()))
    }

    /// Load settings from a specific file, with environment overrides
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file is unreadable or invalid.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Load(format!(
                "configuration file {} does not exist",
                path.display()
            )));
        }

        let figment = Self::defaults()?
            .merge(Toml::file(path))
            .merge(Self::env());
        Self::extract(&figment)
    }

    /// Parse settings from a TOML document on top of the defaults
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the document is invalid.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        Self::extract(&Self::defaults()?.merge(Toml::string(document)))
    }

    /// Get the recommended config path under the user's config directory
    #[must_use]
    pub fn recommended_path() -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from("./config.toml"),
            |config_dir| config_dir.join("sso-oauth").join("config.toml"),
        )
    }

    fn defaults() -> Result<Figment, ConfigError> {
        let defaults =
            toml::to_string(&Self::default()).map_err(|e| ConfigError::Load(e.to_string()))?;
        Ok(Figment::new().merge(Toml::string(&defaults)))
    }

    fn env() -> Env {
        Env::prefixed("SSO_").split("__").lowercase(true)
    }

    fn extract(figment: &Figment) -> Result<Self, ConfigError> {
        figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Validate the settings and build the immutable provider configuration
    ///
    /// Checks run in order: name, strategy type, user-info route, handshake
    /// endpoints, credentials, URL syntax. The first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered.
    pub fn resolve(&self) -> Result<ProviderConfig, ConfigError> {
        let oauth = &self.oauth;

        let name = oauth.name.trim();
        if name.is_empty() {
            return Err(ConfigError::MissingName);
        }

        let kind: StrategyKind = oauth.strategy.parse()?;

        let root = script_path(&oauth.root);
        let derived = |path: &str| root.as_ref().map(|root| format!("{root}{path}"));

        let user_info_url = non_empty(oauth.user_info_url.as_deref())
            .map(ToString::to_string)
            .or_else(|| derived(USER_INFO_PATH))
            .ok_or(ConfigError::MissingUserRoute)?;

        let endpoints = match kind {
            StrategyKind::OAuth1 => Endpoints::OAuth1 {
                request_token_url: non_empty(oauth.request_token_url.as_deref())
                    .map(ToString::to_string)
                    .or_else(|| derived(REQUEST_TOKEN_PATH))
                    .ok_or(ConfigError::MissingEndpoint("request_token_url"))?,
                access_token_url: non_empty(oauth.access_token_url.as_deref())
                    .map(ToString::to_string)
                    .or_else(|| derived(ACCESS_TOKEN_PATH))
                    .ok_or(ConfigError::MissingEndpoint("access_token_url"))?,
                authorize_url: non_empty(oauth.authorize_url.as_deref())
                    .map(ToString::to_string)
                    .or_else(|| derived(AUTHORIZE_PATH))
                    .ok_or(ConfigError::MissingEndpoint("authorize_url"))?,
            },
            StrategyKind::OAuth2 => Endpoints::OAuth2 {
                authorize_url: non_empty(oauth.authorize_url.as_deref())
                    .ok_or(ConfigError::MissingEndpoint("authorize_url"))?
                    .to_string(),
                token_url: non_empty(oauth.token_url.as_deref())
                    .ok_or(ConfigError::MissingEndpoint("token_url"))?
                    .to_string(),
            },
        };

        let credentials = ClientCredentials {
            key: non_empty(oauth.key.as_deref())
                .ok_or(ConfigError::MissingCredential("key"))?
                .to_string(),
            secret: non_empty(oauth.secret.as_deref())
                .ok_or(ConfigError::MissingCredential("secret"))?
                .to_string(),
        };

        let callback_url = format!("{}/auth/{name}/callback", self.url.trim_end_matches('/'));

        check_url("user_info_url", &user_info_url)?;
        for (field, url) in endpoints.urls() {
            check_url(field, url)?;
        }
        check_url("url", &callback_url)?;

        Ok(ProviderConfig {
            name: name.to_string(),
            kind,
            endpoints,
            user_info_url,
            credentials,
            callback_url,
            scope: split_scope(oauth.scope.as_deref()),
            icon: oauth.icon.clone(),
            admin_claim: non_empty(oauth.admin_claim.as_deref()).map(ToString::to_string),
            admin_grant: oauth.admin_grant,
        })
    }
}

/// Handshake endpoints for the configured protocol version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoints {
    /// OAuth 1.0a three-legged flow
    OAuth1 {
        /// Temporary credential (request token) endpoint
        request_token_url: String,
        /// Token credential (access token) endpoint
        access_token_url: String,
        /// Resource owner authorization endpoint
        authorize_url: String,
    },
    /// OAuth 2.0 authorization code flow
    OAuth2 {
        /// Authorization endpoint
        authorize_url: String,
        /// Token endpoint
        token_url: String,
    },
}

impl Endpoints {
    /// Get the authorization endpoint
    #[must_use]
    pub fn authorize_url(&self) -> &str {
        match self {
            Self::OAuth1 { authorize_url, .. } | Self::OAuth2 { authorize_url, .. } => {
                authorize_url
            }
        }
    }

    fn urls(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::OAuth1 {
                request_token_url,
                access_token_url,
                authorize_url,
            } => vec![
                ("request_token_url", request_token_url.as_str()),
                ("access_token_url", access_token_url.as_str()),
                ("authorize_url", authorize_url.as_str()),
            ],
            Self::OAuth2 {
                authorize_url,
                token_url,
            } => vec![
                ("authorize_url", authorize_url.as_str()),
                ("token_url", token_url.as_str()),
            ],
        }
    }
}

/// Consumer key/secret (OAuth 1.0a) or client id/secret (OAuth 2.0)
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    /// Consumer key or client id
    pub key: String,
    /// Consumer secret or client secret
    pub secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("key", &self.key)
            .field("secret", &"[redacted]")
            .finish()
    }
}

/// Validated, immutable provider configuration
///
/// Built once by [`SsoSettings::resolve`] and shared behind an `Arc` for the
/// life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    name: String,
    kind: StrategyKind,
    endpoints: Endpoints,
    user_info_url: String,
    credentials: ClientCredentials,
    callback_url: String,
    scope: Vec<String>,
    icon: String,
    admin_claim: Option<String>,
    admin_grant: AdminGrantPolicy,
}

impl ProviderConfig {
    /// Provider name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Protocol version
    #[must_use]
    pub const fn kind(&self) -> StrategyKind {
        self.kind
    }

    /// Handshake endpoints
    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// User-info endpoint
    #[must_use]
    pub fn user_info_url(&self) -> &str {
        &self.user_info_url
    }

    /// Client credentials
    #[must_use]
    pub const fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }

    /// Absolute callback URL registered with the provider
    #[must_use]
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Requested scopes
    #[must_use]
    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    /// Login button icon
    #[must_use]
    pub fn icon(&self) -> &str {
        &self.icon
    }

    /// Profile key marking administrators, if any
    #[must_use]
    pub fn admin_claim(&self) -> Option<&str> {
        self.admin_claim.as_deref()
    }

    /// Administrators group join policy
    #[must_use]
    pub const fn admin_grant(&self) -> AdminGrantPolicy {
        self.admin_grant
    }

    /// Per-user field holding the external id, e.g. `wikiId`
    #[must_use]
    pub fn id_field(&self) -> String {
        format!("{}Id", self.name)
    }

    /// Association mapping external ids to uids, e.g. `wikiId:uid`
    #[must_use]
    pub fn mapping_key(&self) -> String {
        format!("{}Id:uid", self.name)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Root URL with a guaranteed trailing slash
fn script_path(root: &str) -> Option<String> {
    let root = root.trim();
    if root.is_empty() {
        None
    } else if root.ends_with('/') {
        Some(root.to_string())
    } else {
        Some(format!("{root}/"))
    }
}

fn split_scope(scope: Option<&str>) -> Vec<String> {
    scope
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn check_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidUrl {
            field,
            reason: e.to_string(),
        })
}
