//! Observability (logging, tracing)
//!
//! The adapter emits structured `tracing` events with `provider`, `uid` and
//! `external_id` fields. Hosts usually install their own subscriber; [`init`]
//! is for standalone use (the CLI, examples, tests).

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
#[must_use]
pub const fn default_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "debug,sso_oauth=trace"
    } else {
        "info"
    }
}

/// Initialize the logging stack
///
/// Sets up:
/// - `RUST_LOG`-based level filtering, falling back to [`default_filter`]
/// - Pretty formatting in debug builds, JSON in release builds
///
/// # Example
///
/// ```rust,no_run
/// use sso_oauth::observability;
///
/// # fn main() -> anyhow::Result<()> {
/// observability::init()?;
/// tracing::info!("Adapter started");
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init() -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter()));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?;
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    }

    Ok(())
}
