//! sso-oauth CLI tool

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sso_oauth_cli_lib::{CheckCommand, LoginCommand, NormalizeCommand};

#[derive(Parser)]
#[command(name = "sso-oauth")]
#[command(version)]
#[command(about = "Check OAuth provider configuration and simulate logins", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./config.toml and the user config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit adapter logs (filtered by `RUST_LOG`)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the provider configuration and show what would be registered
    Check,
    /// Normalize a saved user-info response
    Normalize {
        /// File holding the raw user-info response
        profile: PathBuf,
    },
    /// Log in with a saved user-info response against an in-memory host
    Login {
        /// File holding the raw user-info response
        profile: PathBuf,

        /// Number of login attempts
        #[arg(short, long, default_value = "1")]
        repeat: usize,

        /// Seed an existing account, as `username:email`
        #[arg(long = "existing", value_name = "USERNAME:EMAIL")]
        existing: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        sso_oauth::observability::init()?;
    }

    match cli.command {
        Commands::Check => {
            CheckCommand::new(cli.config).execute(cli.json)?;
        }
        Commands::Normalize { profile } => {
            NormalizeCommand::new(profile, cli.config).execute()?;
        }
        Commands::Login {
            profile,
            repeat,
            existing,
        } => {
            let mut cmd = LoginCommand::new(profile, cli.config, repeat);
            for seed in existing {
                let (username, email) = seed
                    .split_once(':')
                    .with_context(|| format!("Expected USERNAME:EMAIL, got `{seed}`"))?;
                cmd = cmd.with_existing_user(username, email);
            }
            cmd.execute(cli.json).await?;
        }
    }

    Ok(())
}
