//! Host extension points
//!
//! The adapter owns no storage. Everything it reads or writes goes through the
//! traits in this module, implemented by the forum platform:
//!
//! - [`UserStore`]: account lookup by email, account creation, per-user fields
//! - [`GroupStore`]: group membership
//! - [`ObjectStore`]: key/field/value associations (the identity mapping)
//! - [`LoginNotifier`]: the host's "successful login" hook
//! - [`AuthRegistry`]: the host's pluggable authentication registry
//!
//! [`memory::MemoryHost`] implements all of them in memory.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::strategy::Strategy;

pub mod memory;

pub use memory::MemoryHost;

/// Errors reported by host services
///
/// These are passed through to the caller unchanged.
#[derive(Debug, Error)]
pub enum HostError {
    /// Username already in use
    #[error("Username `{0}` is already taken")]
    UsernameTaken(String),

    /// Email address rejected by the host
    #[error("Invalid email address `{0}`")]
    InvalidEmail(String),

    /// Username rejected by the host
    #[error("Invalid username `{0}`")]
    InvalidUsername(String),

    /// Unknown uid
    #[error("No such user: {0}")]
    NoSuchUser(u64),

    /// Storage backend failure
    #[error("Host storage error: {0}")]
    Storage(String),

    /// Any other host failure
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Data for a new local account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Username (the provider display name)
    pub username: String,
    /// Email address
    pub email: String,
}

/// Host user service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find the uid registered with `email`
    async fn uid_by_email(&self, email: &str) -> Result<Option<u64>, HostError>;

    /// Create an account and return its uid
    ///
    /// Fails with [`HostError::UsernameTaken`] or [`HostError::InvalidEmail`]
    /// when the host rejects the data.
    async fn create_user(&self, user: NewUser) -> Result<u64, HostError>;

    /// Read a per-user field
    async fn get_user_field(&self, uid: u64, field: &str) -> Result<Option<String>, HostError>;

    /// Write a per-user field
    async fn set_user_field(&self, uid: u64, field: &str, value: &str) -> Result<(), HostError>;
}

/// Host group service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Add `uid` to `group`
    async fn join(&self, group: &str, uid: u64) -> Result<(), HostError>;
}

/// Host key/field/value store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read `field` of object `key`
    async fn get_object_field(&self, key: &str, field: &str) -> Result<Option<String>, HostError>;

    /// Write `field` of object `key`
    async fn set_object_field(&self, key: &str, field: &str, value: &str)
        -> Result<(), HostError>;

    /// Remove `field` from object `key`; removing a missing field is not an error
    async fn delete_object_field(&self, key: &str, field: &str) -> Result<(), HostError>;
}

/// Host "successful login" hook
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoginNotifier: Send + Sync {
    /// Called once a login resolved to `uid`
    async fn on_successful_login(&self, uid: u64) -> Result<(), HostError>;
}

/// Host pluggable authentication registry
#[cfg_attr(test, mockall::automock)]
pub trait AuthRegistry: Send + Sync {
    /// Make `strategy` available under its name
    fn use_strategy(&self, strategy: Arc<Strategy>);
}

/// Bundle of host services used by the adapter
#[derive(Clone)]
pub struct HostServices {
    /// User service
    pub users: Arc<dyn UserStore>,
    /// Group service
    pub groups: Arc<dyn GroupStore>,
    /// Key/field/value store
    pub db: Arc<dyn ObjectStore>,
    /// Successful-login hook
    pub notifier: Arc<dyn LoginNotifier>,
}

impl HostServices {
    /// Bundle individual services
    pub fn new(
        users: Arc<dyn UserStore>,
        groups: Arc<dyn GroupStore>,
        db: Arc<dyn ObjectStore>,
        notifier: Arc<dyn LoginNotifier>,
    ) -> Self {
        Self {
            users,
            groups,
            db,
            notifier,
        }
    }

    /// Use one value implementing every service
    pub fn from_host<H>(host: Arc<H>) -> Self
    where
        H: UserStore + GroupStore + ObjectStore + LoginNotifier + 'static,
    {
        Self {
            users: host.clone(),
            groups: host.clone(),
            db: host.clone(),
            notifier: host,
        }
    }
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}
