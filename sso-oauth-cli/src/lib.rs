//! sso-oauth CLI library
//!
//! Command implementations behind the `sso-oauth` binary. Each command returns
//! a serializable report; the binary prints it.

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

pub mod commands;

use std::path::Path;

use anyhow::{Context, Result};
use sso_oauth::config::SsoSettings;

pub use commands::{CheckCommand, CheckReport, LoginCommand, LoginReport, NormalizeCommand};

/// Load settings from `path`, or from the standard locations when `None`
///
/// # Errors
///
/// Returns an error if a configuration source cannot be read or parsed.
pub fn load_settings(path: Option<&Path>) -> Result<SsoSettings> {
    match path {
        Some(path) => SsoSettings::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => SsoSettings::load().context("Failed to load configuration"),
    }
}

/// Read a saved user-info response
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_profile(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read user info response {}", path.display()))
}
