//! Account-data lifecycle hooks
//!
//! Keeps the identity link consistent with the host's user records: the
//! `<name>Id` field is exposed through the host's field whitelist, and the
//! mapping entry is removed when an account is deleted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ProviderConfig;
use crate::host::{HostError, HostServices};

/// Parameters of the host's "whitelist user fields" hook
///
/// Keys other than `whitelist` are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistParams {
    /// Readable user fields
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Remaining hook data
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WhitelistParams {
    /// Parameters with the given whitelist and no extra data
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            whitelist: fields.into_iter().map(Into::into).collect(),
            extra: Map::new(),
        }
    }
}

/// Whitelist and delete hooks for one provider
#[derive(Debug, Clone)]
pub struct AccountHooks {
    config: Arc<ProviderConfig>,
    host: HostServices,
}

impl AccountHooks {
    /// Create hooks for `config`
    #[must_use]
    pub const fn new(config: Arc<ProviderConfig>, host: HostServices) -> Self {
        Self { config, host }
    }

    /// Add `<name>Id` to the whitelist
    ///
    /// The field is appended once: a whitelist that already names it is
    /// returned unchanged. Other entries, duplicates included, are kept as
    /// given.
    #[must_use]
    pub fn whitelist_fields(&self, mut params: WhitelistParams) -> WhitelistParams {
        let field = self.config.id_field();
        if !params.whitelist.contains(&field) {
            params.whitelist.push(field);
        }
        params
    }

    /// Remove the identity mapping entry of `uid`
    ///
    /// Must run before the host purges the user record, since the external id
    /// is read from it. A user without a link is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the host cannot read the user or delete the
    /// mapping entry.
    pub async fn delete_user_data(&self, uid: u64) -> Result<(), HostError> {
        let external_id = self
            .host
            .users
            .get_user_field(uid, &self.config.id_field())
            .await?
            .filter(|id| !id.is_empty());

        let Some(external_id) = external_id else {
            tracing::debug!(
                provider = %self.config.name(),
                uid = uid,
                "No identity link to remove"
            );
            return Ok(());
        };

        self.host
            .db
            .delete_object_field(&self.config.mapping_key(), &external_id)
            .await?;

        tracing::info!(
            provider = %self.config.name(),
            uid = uid,
            external_id = %external_id,
            "Removed identity link"
        );
        Ok(())
    }
}
