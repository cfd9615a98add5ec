//! Login simulation command

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::{style, Emoji};
use serde::Serialize;
use sso_oauth::host::{HostServices, MemoryHost};
use sso_oauth::identity::{LoginPayload, ADMINISTRATORS_GROUP};
use sso_oauth::plugin::SsoPlugin;

static SUCCESS: Emoji = Emoji("✓", "√");
static INFO: Emoji = Emoji("ℹ", "i");

/// Outcome of a simulated login sequence
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginReport {
    /// External id taken from the profile
    pub external_id: String,
    /// Resolved uid of each attempt, in order
    pub uids: Vec<u64>,
    /// Accounts in the in-memory host afterwards
    pub accounts: usize,
    /// Whether the account joined the administrators group
    pub is_admin: bool,
}

/// Simulate logins against an in-memory host
#[derive(Debug, Clone)]
pub struct LoginCommand {
    profile: PathBuf,
    config: Option<PathBuf>,
    repeat: usize,
    existing: Vec<(String, String)>,
}

impl LoginCommand {
    /// Create a new command instance
    #[must_use]
    pub const fn new(profile: PathBuf, config: Option<PathBuf>, repeat: usize) -> Self {
        Self {
            profile,
            config,
            repeat,
            existing: Vec::new(),
        }
    }

    /// Seed the host with an account before logging in
    #[must_use]
    pub fn with_existing_user(
        mut self,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        self.existing.push((username.into(), email.into()));
        self
    }

    /// Run the simulation
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the profile is
    /// malformed, or any login attempt fails.
    pub async fn run(&self) -> Result<LoginReport> {
        let settings = crate::load_settings(self.config.as_deref())?;
        let body = crate::read_profile(&self.profile)?;

        let host = MemoryHost::new();
        for (username, email) in &self.existing {
            host.insert_user(username, email)
                .await
                .with_context(|| format!("Failed to seed user {username}"))?;
        }

        let plugin = SsoPlugin::new(&settings, HostServices::from_host(Arc::new(host.clone())));
        if let Some(e) = plugin.config_error() {
            return Err(
                anyhow::Error::new(e.clone()).context("OAuth provider configuration is invalid")
            );
        }

        let profile = plugin
            .parse_user_return(&body)
            .context("User info response could not be normalized")?;
        let payload = LoginPayload::from_profile(&profile)?;

        let mut uids = Vec::with_capacity(self.repeat.max(1));
        for attempt in 1..=self.repeat.max(1) {
            let account = plugin
                .login(&payload)
                .await
                .with_context(|| format!("Login attempt {attempt} failed"))?;
            uids.push(account.uid);
        }

        let is_admin = match uids.first() {
            Some(uid) => host.group_members(ADMINISTRATORS_GROUP).await.contains(uid),
            None => false,
        };

        Ok(LoginReport {
            external_id: payload.external_id,
            uids,
            accounts: host.user_count().await,
            is_admin,
        })
    }

    /// Execute the command
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn execute(&self, json: bool) -> Result<()> {
        let report = self.run().await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        for (attempt, uid) in report.uids.iter().enumerate() {
            println!(
                "{} Login {} for {} resolved to uid {}",
                style(SUCCESS).green(),
                attempt + 1,
                style(&report.external_id).cyan(),
                style(uid).bold()
            );
        }
        println!(
            "{} {} account(s) in host{}",
            style(INFO).blue(),
            report.accounts,
            if report.is_admin { ", member of administrators" } else { "" }
        );

        Ok(())
    }
}
