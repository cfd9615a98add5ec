//! sso-oauth: single sign-on adapter for forum-style hosts
//!
//! Lets a forum authenticate users against a third-party OAuth 1.0a or OAuth 2.0
//! provider and maps the provider identity onto local accounts. The adapter is
//! a plugin: the host calls it at its extension points, and it reads and writes
//! only through host services.
//!
//! Two pieces carry the logic:
//!
//! - the account-linking decision ([`identity::IdentityResolver`]): existing
//!   link, else account with the same email, else a new account
//! - profile normalization ([`profile`]): provider user-info responses are
//!   turned into a fixed shape and validated
//!
//! Request signing and token exchange belong to the protocol client
//! ([`strategy::Handshake`]); storage belongs to the host ([`host`]).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sso_oauth::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     sso_oauth::observability::init()?;
//!
//!     // Any type implementing the host traits; the in-memory host for demos
//!     let host = MemoryHost::new();
//!     let settings = SsoSettings::load()?;
//!
//!     let plugin = SsoPlugin::new(&settings, HostServices::from_host(Arc::new(host.clone())));
//!     let strategies = plugin.get_strategy(Vec::new(), &host)?;
//!     println!("{strategies:?}");
//!
//!     let profile =
//!         plugin.parse_user_return(r#"{"id":"w123","name":"alice","email":"a@x.com"}"#)?;
//!     let account = plugin.login(&LoginPayload::from_profile(&profile)?).await?;
//!     println!("logged in as uid {}", account.uid);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Persisted data
//!
//! For a provider named `wiki` the adapter stores:
//!
//! - user field `wikiId` holding the external id
//! - object `wikiId:uid` mapping each external id to its uid

pub mod config;
pub mod error;
pub mod host;
pub mod identity;
pub mod lifecycle;
pub mod observability;
pub mod plugin;
pub mod profile;
pub mod strategy;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! ```rust
    //! use sso_oauth::prelude::*;
    //! ```

    pub use crate::config::{
        AdminGrantPolicy, ConfigError, ProviderConfig, SsoSettings, StrategyKind,
    };
    pub use crate::error::SsoError;
    pub use crate::host::{
        AuthRegistry, GroupStore, HostError, HostServices, LoginNotifier, MemoryHost, NewUser,
        ObjectStore, UserStore,
    };
    pub use crate::identity::{IdentityResolver, LocalAccountRef, LoginError, LoginPayload};
    pub use crate::lifecycle::{AccountHooks, WhitelistParams};
    pub use crate::plugin::SsoPlugin;
    pub use crate::profile::{
        EnvelopeNormalizer, NormalizedProfile, ParseError, ProfileEmail, ProfileNormalizer,
    };
    pub use crate::strategy::{
        AccessGrant, AuthorizationRequest, CallbackParams, Handshake, HandshakeError,
        OAuth1Handshake, OAuth2Handshake, ProfileFetcher, Registrar, Strategy, StrategyDescriptor,
    };
}
