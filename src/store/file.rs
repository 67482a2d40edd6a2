//! JSON file backed store.
//!
//! The whole map is rewritten on each change through a temp file and an
//! atomic rename, so a crash mid-write never leaves a truncated state file.

use super::{CHANGE_CAPACITY, StateStore, StoreChange, StoreMap, merge_changes, select_keys};
use crate::error::{ReminderError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Durable [`StateStore`] persisted to a single JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<StoreMap>,
    changes: broadcast::Sender<StoreChange>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A corrupt file is moved aside to `<name>.corrupt` and the store starts
    /// empty, so defaults are re-derived instead of failing startup.
    ///
    /// # Errors
    ///
    /// Returns [`ReminderError::Store`] when an existing file cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = load_map(&path)?;
        debug!(
            "opened state store at {} ({} keys)",
            path.display(),
            values.len()
        );
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self {
            path,
            values: Mutex::new(values),
            changes,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreMap>> {
        self.values
            .lock()
            .map_err(|_| ReminderError::Store("state store lock poisoned".to_owned()))
    }
}

fn load_map(path: &Path) -> Result<StoreMap> {
    let bytes = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreMap::new()),
        Err(e) => {
            return Err(ReminderError::Store(format!(
                "cannot read state {}: {e}",
                path.display()
            )));
        }
    };

    match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => {
            warn!("state file holds {other} instead of an object, starting empty");
            quarantine(path);
            Ok(StoreMap::new())
        }
        Err(e) => {
            warn!("cannot parse state file {}: {e}; starting empty", path.display());
            quarantine(path);
            Ok(StoreMap::new())
        }
    }
}

fn quarantine(path: &Path) {
    let mut aside = path.as_os_str().to_owned();
    aside.push(".corrupt");
    if let Err(e) = std::fs::rename(path, &aside) {
        warn!("cannot move corrupt state file aside: {e}");
    }
}

fn write_map(path: &Path, values: &StoreMap) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ReminderError::Store(format!("cannot create state dir: {e}")))?;
    }

    let json = serde_json::to_vec_pretty(values)
        .map_err(|e| ReminderError::Store(format!("cannot serialize state: {e}")))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, json)
        .map_err(|e| ReminderError::Store(format!("cannot write state: {e}")))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| ReminderError::Store(format!("cannot replace state file: {e}")))?;
    Ok(())
}

#[async_trait]
impl StateStore for JsonFileStore {
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
            let mut next = current.clone();
            let changed = merge_changes(&mut next, values);
            if changed.is_empty() {
                return Ok(());
            }
            write_map(&self.path, &next)?;
            *current = next;
            changed
        };

        debug!(
            keys = ?changed.keys().collect::<Vec<_>>(),
            "state persisted to {}",
            self.path.display()
        );
        let _ = self.changes.send(StoreChange { changed });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
