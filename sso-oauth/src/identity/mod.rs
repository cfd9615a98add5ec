//! Identity resolution
//!
//! Maps an external identity onto a local account, creating and linking one
//! when needed. The link is persisted twice through the host:
//!
//! - per-user field `<name>Id` holding the external id
//! - association `<name>Id:uid` mapping external id to uid
//!
//! Resolution order is fixed: existing link, then account with the same email,
//! then a new account. An existing link always wins, so a changed email on the
//! provider side never produces a second account. An account has at most one
//! link per provider: linking it under a new id by email drops the old
//! mapping entry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AdminGrantPolicy, ProviderConfig};
use crate::host::{HostError, HostServices, NewUser};
use crate::profile::{NormalizedProfile, ParseError};

pub mod locks;

pub use locks::LinkLocks;

/// Group joined by admin-flagged logins
pub const ADMINISTRATORS_GROUP: &str = "administrators";

/// Login errors
#[derive(Debug, Error)]
pub enum LoginError {
    /// Host service failure, passed through unchanged
    #[error(transparent)]
    Host(#[from] HostError),

    /// The identity mapping holds something that is not a uid
    #[error("Identity link for `{external_id}` holds invalid uid `{value}`")]
    CorruptLink {
        /// External id looked up
        external_id: String,
        /// Stored value
        value: String,
    },

    /// Payload without an external id
    #[error("Login payload is missing an external id")]
    MissingExternalId,

    /// Payload without an email address
    #[error("Login payload is missing an email address")]
    MissingEmail,
}

/// Data handed from the handshake to identity resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    /// Provider-side user id
    #[serde(rename = "oAuthid")]
    pub external_id: String,
    /// Username for a new account
    pub handle: String,
    /// Email address for lookup and new accounts
    pub email: String,
    /// Join the administrators group
    #[serde(default)]
    pub is_admin: bool,
}

impl LoginPayload {
    /// Build the payload from a normalized profile (first email address)
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MissingField`] if the profile has no email.
    pub fn from_profile(profile: &NormalizedProfile) -> Result<Self, ParseError> {
        let email = profile
            .primary_email()
            .ok_or_else(|| ParseError::MissingField("email".to_string()))?;

        Ok(Self {
            external_id: profile.external_id.clone(),
            handle: profile.display_name.clone(),
            email: email.to_string(),
            is_admin: profile.is_admin,
        })
    }
}

/// Handle to a local account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalAccountRef {
    /// Local uid
    pub uid: u64,
}

/// Finds or creates the local account for an external identity
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    config: Arc<ProviderConfig>,
    host: HostServices,
    locks: Arc<LinkLocks>,
}

impl IdentityResolver {
    /// Create a resolver for `config`
    #[must_use]
    pub fn new(config: Arc<ProviderConfig>, host: HostServices) -> Self {
        Self {
            config,
            host,
            locks: Arc::new(LinkLocks::new()),
        }
    }

    /// Provider configuration
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Look up the uid linked to `external_id`
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Host`] if the store fails, or
    /// [`LoginError::CorruptLink`] if the stored value is not a uid.
    pub async fn uid_by_external_id(&self, external_id: &str) -> Result<Option<u64>, LoginError> {
        let stored = self
            .host
            .db
            .get_object_field(&self.config.mapping_key(), external_id)
            .await?;

        stored
            .filter(|value| !value.is_empty())
            .map(|value| {
                value.parse::<u64>().map_err(|_| LoginError::CorruptLink {
                    external_id: external_id.to_string(),
                    value,
                })
            })
            .transpose()
    }

    /// Resolve the payload to a local account
    ///
    /// Repeated logins by the same external identity return the same uid and
    /// never create another account.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError`] if the payload is incomplete, an account cannot
    /// be found or created, the link cannot be persisted, or (under
    /// [`AdminGrantPolicy::Required`]) the administrators group join fails.
    pub async fn login(&self, payload: &LoginPayload) -> Result<LocalAccountRef, LoginError> {
        if payload.external_id.trim().is_empty() {
            return Err(LoginError::MissingExternalId);
        }
        if payload.email.trim().is_empty() {
            return Err(LoginError::MissingEmail);
        }

        let provider = self.config.name();

        if let Some(uid) = self.uid_by_external_id(&payload.external_id).await? {
            tracing::debug!(
                provider = %provider,
                external_id = %payload.external_id,
                uid = uid,
                "Existing identity link"
            );
            return Ok(LocalAccountRef { uid });
        }

        let _guard = self.locks.acquire(&payload.external_id).await;

        // Another login for this id may have linked it while we waited
        if let Some(uid) = self.uid_by_external_id(&payload.external_id).await? {
            return Ok(LocalAccountRef { uid });
        }

        let uid = if let Some(uid) = self.host.users.uid_by_email(&payload.email).await? {
            tracing::info!(
                provider = %provider,
                external_id = %payload.external_id,
                uid = uid,
                "Linking existing account by email"
            );
            self.release_previous_link(uid, &payload.external_id).await?;
            uid
        } else {
            let uid = self
                .host
                .users
                .create_user(NewUser {
                    username: payload.handle.clone(),
                    email: payload.email.clone(),
                })
                .await?;
            tracing::info!(
                provider = %provider,
                external_id = %payload.external_id,
                uid = uid,
                "Created account for external identity"
            );
            uid
        };

        self.link(uid, &payload.external_id).await?;

        if payload.is_admin {
            self.grant_admin(uid).await?;
        }

        Ok(LocalAccountRef { uid })
    }

    /// Drop the mapping entry of the id `uid` was linked under before
    async fn release_previous_link(&self, uid: u64, external_id: &str) -> Result<(), LoginError> {
        let previous = self
            .host
            .users
            .get_user_field(uid, &self.config.id_field())
            .await?
            .filter(|previous| !previous.is_empty() && previous != external_id);
        let Some(previous) = previous else {
            return Ok(());
        };

        let mapping_key = self.config.mapping_key();
        let mapped = self.host.db.get_object_field(&mapping_key, &previous).await?;
        if mapped.as_deref() == Some(uid.to_string().as_str()) {
            self.host.db.delete_object_field(&mapping_key, &previous).await?;
        }

        tracing::warn!(
            provider = %self.config.name(),
            uid = uid,
            previous_id = %previous,
            external_id = %external_id,
            "Replacing identity link of account matched by email"
        );
        Ok(())
    }

    async fn link(&self, uid: u64, external_id: &str) -> Result<(), LoginError> {
        self.host
            .users
            .set_user_field(uid, &self.config.id_field(), external_id)
            .await?;
        self.host
            .db
            .set_object_field(&self.config.mapping_key(), external_id, &uid.to_string())
            .await?;
        Ok(())
    }

    async fn grant_admin(&self, uid: u64) -> Result<(), LoginError> {
        match self.host.groups.join(ADMINISTRATORS_GROUP, uid).await {
            Ok(()) => {
                tracing::info!(
                    provider = %self.config.name(),
                    uid = uid,
                    "Granted administrator rights"
                );
                Ok(())
            }
            Err(e) => match self.config.admin_grant() {
                AdminGrantPolicy::Required => Err(e.into()),
                AdminGrantPolicy::BestEffort => {
                    tracing::warn!(
                        provider = %self.config.name(),
                        uid = uid,
                        error = %e,
                        "Failed to join administrators group"
                    );
                    Ok(())
                }
            },
        }
    }
}
