//! Per-external-id serialisation of first logins

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Table of async locks keyed by external id
///
/// Entries are held weakly and pruned once no login holds them.
#[derive(Debug, Default)]
pub struct LinkLocks {
    slots: parking_lot::Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl LinkLocks {
    /// Create an empty lock table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `external_id`
    pub async fn acquire(&self, external_id: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock();
            slots.retain(|_, slot| slot.strong_count() > 0);

            slots
                .get(external_id)
                .and_then(Weak::upgrade)
                .unwrap_or_else(|| {
                    let fresh = Arc::new(Mutex::new(()));
                    slots.insert(external_id.to_string(), Arc::downgrade(&fresh));
                    fresh
                })
        };

        slot.lock_owned().await
    }

    /// Number of ids currently locked or awaited
    #[must_use]
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.strong_count() > 0)
            .count()
    }
}
