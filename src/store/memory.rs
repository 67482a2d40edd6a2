//! In-process store with the same change semantics as the file store.

use super::{CHANGE_CAPACITY, StateStore, StoreChange, StoreMap, merge_changes, select_keys};
use crate::error::{ReminderError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Non-durable [`StateStore`], used by tests and ephemeral hosts.
#[derive(Debug)]
pub struct MemoryStore {
    values: Mutex<StoreMap>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_values(StoreMap::new())
    }

    /// Start from pre-seeded values (no change event is emitted for them).
    #[must_use]
    pub fn with_values(values: StoreMap) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            values: Mutex::new(values),
            changes,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreMap>> {
        self.values
            .lock()
            .map_err(|_| ReminderError::Store("memory store lock poisoned".to_owned()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        let values = self.lock()?;
        Ok(select_keys(&values, keys))
    }

    async fn get_all(&self) -> Result<StoreMap> {
        Ok(self.lock()?.clone())
    }

    async fn set(&self, values: StoreMap) -> Result<()> {
        let changed = {
            let mut current = self.lock()?;
            merge_changes(&mut current, values)
        };
        if !changed.is_empty() {
            let _ = self.changes.send(StoreChange { changed });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
