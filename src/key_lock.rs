//! Per-key async mutual exclusion
//!
//! [`KeyedLock`] hands out one async mutex per key so that work on the same
//! key is serialized while unrelated keys proceed concurrently. Entries are
//! dropped from the table as soon as nobody holds or waits on them.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub struct KeyedLock<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

/// Held while the caller owns the key; releases on drop.
pub struct KeyGuard<'a, K>
where
    K: Eq + Hash + Clone,
{
    owner: &'a KeyedLock<K>,
    key: K,
    _held: OwnedMutexGuard<()>,
}

impl<K> KeyedLock<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until `key` is free and take it.
    pub async fn lock(&self, key: K) -> KeyGuard<'_, K> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                slots
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };

        let held = slot.lock_owned().await;
        KeyGuard {
            owner: self,
            key,
            _held: held,
        }
    }

    /// Number of keys currently held or waited on.
    pub fn active_keys(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<K> Default for KeyedLock<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for KeyGuard<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        let mut slots = self
            .owner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference in the table plus the one inside our guard means no waiters.
        if let Some(slot) = slots.get(&self.key)
            && Arc::strong_count(slot) <= 2
        {
            slots.remove(&self.key);
        }
    }
}
