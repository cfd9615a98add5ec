//! Configuration check command

use std::path::PathBuf;

use anyhow::{Context, Result};
use console::{style, Emoji};
use serde::Serialize;
use sso_oauth::config::StrategyKind;
use sso_oauth::strategy::StrategyDescriptor;

static SUCCESS: Emoji = Emoji("✓", "√");

/// Resolved configuration summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    /// Strategy as it would be registered
    pub strategy: StrategyDescriptor,
    /// Protocol version
    pub kind: StrategyKind,
    /// Absolute callback URL to register with the provider
    pub callback_url: String,
    /// Authorization endpoint
    pub authorize_url: String,
    /// User-info endpoint
    pub user_info_url: String,
    /// Per-user field holding the external id
    pub id_field: String,
    /// Identity mapping key
    pub mapping_key: String,
}

/// Resolve the configuration and report what would be registered
#[derive(Debug, Clone, Default)]
pub struct CheckCommand {
    config: Option<PathBuf>,
}

impl CheckCommand {
    /// Create a new command instance
    #[must_use]
    pub const fn new(config: Option<PathBuf>) -> Self {
        Self { config }
    }

    /// Build the report
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be loaded or do not resolve.
    pub fn run(&self) -> Result<CheckReport> {
        let settings = crate::load_settings(self.config.as_deref())?;
        let config = settings
            .resolve()
            .context("OAuth provider configuration is invalid")?;

        Ok(CheckReport {
            strategy: StrategyDescriptor::for_config(&config),
            kind: config.kind(),
            callback_url: config.callback_url().to_string(),
            authorize_url: config.endpoints().authorize_url().to_string(),
            user_info_url: config.user_info_url().to_string(),
            id_field: config.id_field(),
            mapping_key: config.mapping_key(),
        })
    }

    /// Execute the command
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn execute(&self, json: bool) -> Result<()> {
        let report = self.run()?;

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!(
            "{} {} {}",
            style(SUCCESS).green(),
            style("Provider").bold(),
            style(&report.strategy.name).cyan().bold()
        );
        println!("  type          {}", report.kind);
        println!("  login route   {}", report.strategy.url);
        println!("  callback      {}", report.callback_url);
        println!("  authorize     {}", report.authorize_url);
        println!("  user info     {}", report.user_info_url);
        println!("  scope         {}", report.strategy.scope.join(","));
        println!("  user field    {}", report.id_field);
        println!("  mapping key   {}", report.mapping_key);

        Ok(())
    }
}
