//! Profile normalization command

use std::path::PathBuf;

use anyhow::{Context, Result};
use sso_oauth::profile::{normalize_body, EnvelopeNormalizer, NormalizedProfile};

/// Run the default normalizer over a saved user-info response
#[derive(Debug, Clone)]
pub struct NormalizeCommand {
    profile: PathBuf,
    config: Option<PathBuf>,
}

impl NormalizeCommand {
    /// Create a new command instance
    #[must_use]
    pub const fn new(profile: PathBuf, config: Option<PathBuf>) -> Self {
        Self { profile, config }
    }

    /// Normalize the profile
    ///
    /// The provider name and admin claim come from the configuration; the rest
    /// of it does not need to be valid.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or the profile is malformed.
    pub fn run(&self) -> Result<NormalizedProfile> {
        let settings = crate::load_settings(self.config.as_deref())?;
        let body = crate::read_profile(&self.profile)?;

        let normalizer = settings
            .oauth
            .admin_claim
            .as_deref()
            .filter(|claim| !claim.is_empty())
            .map_or_else(EnvelopeNormalizer::new, |claim| {
                EnvelopeNormalizer::new().with_admin_claim(claim)
            });

        normalize_body(&normalizer, &body, &settings.oauth.name)
            .context("User info response could not be normalized")
    }

    /// Execute the command
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn execute(&self) -> Result<()> {
        let profile = self.run()?;
        println!("{}", serde_json::to_string_pretty(&profile)?);
        Ok(())
    }
}
