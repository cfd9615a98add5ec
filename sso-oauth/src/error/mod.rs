//! Error types and error handling
//!
//! Each module has its own error enum. [`SsoError`] wraps all of them for the
//! host-facing surface, where any failure of a login is reported to the user as
//! a generic authentication failure.

use thiserror::Error;

use crate::config::ConfigError;
use crate::host::HostError;
use crate::identity::LoginError;
use crate::profile::ParseError;
use crate::strategy::HandshakeError;

/// Adapter error type
#[derive(Debug, Error)]
pub enum SsoError {
    /// Invalid provider configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed provider profile
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Account resolution or linking failure
    #[error(transparent)]
    Login(#[from] LoginError),

    /// Protocol handshake failure
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Host service failure
    #[error(transparent)]
    Host(#[from] HostError),
}

impl SsoError {
    /// Short category name for structured logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Parse(_) => "parse",
            Self::Login(_) => "login",
            Self::Handshake(_) => "handshake",
            Self::Host(_) => "host",
        }
    }
}

/// Result type for adapter operations
pub type Result<T, E = SsoError> = std::result::Result<T, E>;
