//! In-memory host
//!
//! Stores users, groups and object fields in maps behind a `tokio::sync::RwLock`.
//! Thread-safe, data is lost when the host is dropped. Useful for tests, demos
//! and the CLI's login simulation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    AuthRegistry, GroupStore, HostError, LoginNotifier, NewUser, ObjectStore, UserStore,
};
use crate::strategy::Strategy;

/// A stored user account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Local uid
    pub uid: u64,
    /// Username
    pub username: String,
    /// Email address
    pub email: String,
    /// Per-user fields
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct Store {
    last_uid: u64,
    users: BTreeMap<u64, UserRecord>,
    objects: HashMap<String, HashMap<String, String>>,
    groups: HashMap<String, BTreeSet<u64>>,
    logins: Vec<u64>,
}

/// In-memory implementation of every host service
#[derive(Clone, Default)]
pub struct MemoryHost {
    store: Arc<RwLock<Store>>,
    strategies: Arc<parking_lot::RwLock<Vec<Arc<Strategy>>>>,
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHost")
            .field("strategies", &self.strategies.read().len())
            .finish_non_exhaustive()
    }
}

impl MemoryHost {
    /// Create an empty host
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account directly, bypassing any adapter logic
    ///
    /// # Errors
    ///
    /// Same validation as [`UserStore::create_user`].
    pub async fn insert_user(&self, username: &str, email: &str) -> Result<u64, HostError> {
        self.create_user(NewUser {
            username: username.to_string(),
            email: email.to_string(),
        })
        .await
    }

    /// Get a copy of an account
    pub async fn user(&self, uid: u64) -> Option<UserRecord> {
        self.store.read().await.users.get(&uid).cloned()
    }

    /// Number of accounts
    pub async fn user_count(&self) -> usize {
        self.store.read().await.users.len()
    }

    /// Read an object field
    pub async fn object_field(&self, key: &str, field: &str) -> Option<String> {
        self.store
            .read()
            .await
            .objects
            .get(key)
            .and_then(|object| object.get(field))
            .cloned()
    }

    /// Number of fields stored in object `key`
    pub async fn object_len(&self, key: &str) -> usize {
        self.store
            .read()
            .await
            .objects
            .get(key)
            .map_or(0, HashMap::len)
    }

    /// Members of `group`
    pub async fn group_members(&self, group: &str) -> BTreeSet<u64> {
        self.store
            .read()
            .await
            .groups
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    /// Every uid passed to the successful-login hook, in order
    pub async fn logins(&self) -> Vec<u64> {
        self.store.read().await.logins.clone()
    }

    /// Strategies registered through [`AuthRegistry`]
    #[must_use]
    pub fn strategies(&self) -> Vec<Arc<Strategy>> {
        self.strategies.read().clone()
    }

    /// Find a registered strategy by name
    #[must_use]
    pub fn strategy(&self, name: &str) -> Option<Arc<Strategy>> {
        self.strategies
            .read()
            .iter()
            .find(|strategy| strategy.name() == name)
            .cloned()
    }
}

fn is_plausible_email(email: &str) -> bool {
    email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
}

#[async_trait]
impl UserStore for MemoryHost {
    async fn uid_by_email(&self, email: &str) -> Result<Option<u64>, HostError> {
        let email = email.trim().to_lowercase();
        Ok(self
            .store
            .read()
            .await
            .users
            .values()
            .find(|user| user.email == email)
            .map(|user| user.uid))
    }

    async fn create_user(&self, user: NewUser) -> Result<u64, HostError> {
        let username = user.username.trim().to_string();
        let email = user.email.trim().to_lowercase();

        if username.is_empty() {
            return Err(HostError::InvalidUsername(user.username));
        }
        if !is_plausible_email(&email) {
            return Err(HostError::InvalidEmail(user.email));
        }

        let mut store = self.store.write().await;
        if store
            .users
            .values()
            .any(|existing| existing.username.eq_ignore_ascii_case(&username))
        {
            return Err(HostError::UsernameTaken(username));
        }

        store.last_uid += 1;
        let uid = store.last_uid;
        store.users.insert(
            uid,
            UserRecord {
                uid,
                username,
                email,
                fields: HashMap::new(),
            },
        );
        drop(store);
        Ok(uid)
    }

    async fn get_user_field(&self, uid: u64, field: &str) -> Result<Option<String>, HostError> {
        self.store
            .read()
            .await
            .users
            .get(&uid)
            .map(|user| user.fields.get(field).cloned())
            .ok_or(HostError::NoSuchUser(uid))
    }

    async fn set_user_field(&self, uid: u64, field: &str, value: &str) -> Result<(), HostError> {
        self.store
            .write()
            .await
            .users
            .get_mut(&uid)
            .ok_or(HostError::NoSuchUser(uid))?
            .fields
            .insert(field.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl GroupStore for MemoryHost {
    async fn join(&self, group: &str, uid: u64) -> Result<(), HostError> {
        let mut store = self.store.write().await;
        if !store.users.contains_key(&uid) {
            return Err(HostError::NoSuchUser(uid));
        }
        store
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(uid);
        drop(store);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryHost {
    async fn get_object_field(&self, key: &str, field: &str) -> Result<Option<String>, HostError> {
        Ok(self.object_field(key, field).await)
    }

    async fn set_object_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<(), HostError> {
        self.store
            .write()
            .await
            .objects
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_object_field(&self, key: &str, field: &str) -> Result<(), HostError> {
        if let Some(object) = self.store.write().await.objects.get_mut(key) {
            object.remove(field);
        }
        Ok(())
    }
}

#[async_trait]
impl LoginNotifier for MemoryHost {
    async fn on_successful_login(&self, uid: u64) -> Result<(), HostError> {
        self.store.write().await.logins.push(uid);
        Ok(())
    }
}

impl AuthRegistry for MemoryHost {
    fn use_strategy(&self, strategy: Arc<Strategy>) {
        let mut strategies = self.strategies.write();
        strategies.retain(|existing| existing.name() != strategy.name());
        strategies.push(strategy);
    }
}
