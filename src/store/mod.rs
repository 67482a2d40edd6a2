//! Persisted key-value state shared by the scheduler and the control surface.
//!
//! The store is a flat JSON object. Three keys are used:
//!
//! | Key | Value |
//! |-----|-------|
//! | `interval` | reminder interval in minutes |
//! | `lastAyah` | last delivered [`Verse`] |
//! | `lastAyahTime` | epoch millis of the last delivery |
//!
//! Every successful `set` that changes at least one value broadcasts a
//! [`StoreChange`] to all subscribers, whichever side wrote it.

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::settings::{DeliveryState, Settings, validate_interval};
use crate::verse::Verse;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

/// JSON object holding stored values.
pub type StoreMap = serde_json::Map<String, serde_json::Value>;

pub const KEY_INTERVAL: &str = "interval";
pub const KEY_LAST_AYAH: &str = "lastAyah";
pub const KEY_LAST_AYAH_TIME: &str = "lastAyahTime";

/// Capacity of the change broadcast channel.
pub(crate) const CHANGE_CAPACITY: usize = 64;

/// Values that changed in one `set` call (new values only).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreChange {
    pub changed: StoreMap,
}

impl StoreChange {
    #[must_use]
    pub fn touches(&self, key: &str) -> bool {
        self.changed.contains_key(key)
    }
}

/// Synchronized key-value store surviving process restarts.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Values for `keys`; absent keys are simply missing from the result.
    async fn get(&self, keys: &[&str]) -> Result<StoreMap>;

    /// Every stored value.
    async fn get_all(&self) -> Result<StoreMap>;

    /// Merge `values` into the store and notify subscribers of what changed.
    async fn set(&self, values: StoreMap) -> Result<()>;

    /// Receive change notifications.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Merge `incoming` into `current`, returning the entries whose value changed.
pub(crate) fn merge_changes(current: &mut StoreMap, incoming: StoreMap) -> StoreMap {
    let mut changed = StoreMap::new();
    for (key, value) in incoming {
        if current.get(&key) != Some(&value) {
            current.insert(key.clone(), value.clone());
            changed.insert(key, value);
        }
    }
    changed
}

/// Pick `keys` out of `values`.
pub(crate) fn select_keys(values: &StoreMap, keys: &[&str]) -> StoreMap {
    keys.iter()
        .filter_map(|key| values.get(*key).map(|v| ((*key).to_owned(), v.clone())))
        .collect()
}

/// Stored interval if present and valid.
///
/// Out-of-range or non-numeric values are logged and reported as absent.
///
/// # Errors
///
/// Propagates store read failures.
pub async fn read_interval(store: &dyn StateStore) -> Result<Option<u32>> {
    let values = store.get(&[KEY_INTERVAL]).await?;
    let Some(raw) = values.get(KEY_INTERVAL) else {
        return Ok(None);
    };

    let parsed = raw.as_u64().and_then(|v| u32::try_from(v).ok());
    match parsed {
        Some(minutes) if validate_interval(minutes).is_ok() => Ok(Some(minutes)),
        _ => {
            warn!("ignoring invalid stored interval {raw}");
            Ok(None)
        }
    }
}

/// Stored settings, or `default` when missing or invalid.
///
/// # Errors
///
/// Propagates store read failures.
pub async fn load_settings(store: &dyn StateStore, default: Settings) -> Result<Settings> {
    Ok(read_interval(store)
        .await?
        .map(|interval_minutes| Settings { interval_minutes })
        .unwrap_or(default))
}

/// Persist the interval.
///
/// # Errors
///
/// Propagates store write failures.
pub async fn save_settings(store: &dyn StateStore, settings: Settings) -> Result<()> {
    let mut values = StoreMap::new();
    values.insert(KEY_INTERVAL.to_owned(), settings.interval_minutes.into());
    store.set(values).await
}

/// Last delivery bookkeeping. Undecodable entries are logged and treated as absent.
///
/// # Errors
///
/// Propagates store read failures.
pub async fn load_delivery_state(store: &dyn StateStore) -> Result<DeliveryState> {
    let values = store.get(&[KEY_LAST_AYAH, KEY_LAST_AYAH_TIME]).await?;

    let last_verse = match values.get(KEY_LAST_AYAH) {
        None | Some(serde_json::Value::Null) => None,
        Some(raw) => match serde_json::from_value::<Verse>(raw.clone()) {
            Ok(verse) => Some(verse),
            Err(e) => {
                warn!("ignoring undecodable stored verse: {e}");
                None
            }
        },
    };

    let last_delivery_ms = values.get(KEY_LAST_AYAH_TIME).and_then(|raw| {
        let parsed = raw.as_u64();
        if parsed.is_none() && !raw.is_null() {
            warn!("ignoring invalid stored delivery time {raw}");
        }
        parsed
    });

    Ok(DeliveryState {
        last_verse,
        last_delivery_ms,
    })
}

/// Record a delivery of `verse` at `at_ms`.
///
/// # Errors
///
/// Propagates serialization and store write failures.
pub async fn save_delivery(store: &dyn StateStore, verse: &Verse, at_ms: u64) -> Result<()> {
    let encoded = serde_json::to_value(verse)
        .map_err(|e| crate::ReminderError::Store(format!("cannot encode verse: {e}")))?;
    let mut values = StoreMap::new();
    values.insert(KEY_LAST_AYAH.to_owned(), encoded);
    values.insert(KEY_LAST_AYAH_TIME.to_owned(), at_ms.into());
    store.set(values).await
}
