//! Centralized application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config + state | `~/Library/Application Support/ayah-reminder/` | `~/.config/ayah-reminder/` |
//! | Data | `~/Library/Application Support/ayah-reminder/` | `~/.local/share/ayah-reminder/` |
//!
//! # Environment Overrides
//!
//! - `AYAH_CONFIG_DIR` overrides [`config_dir`]
//! - `AYAH_DATA_DIR` overrides [`data_dir`]
//! - `AYAH_CONFIG` points at an explicit config file (see [`config_file`])

use std::path::PathBuf;

const APP_DIR_NAME: &str = "ayah-reminder";

/// Application config directory.
///
/// Holds `config.toml` and the persisted `state.json`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("AYAH_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("/tmp/ayah-reminder-config"))
}

/// Application data directory (logs and anything not user-editable).
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("AYAH_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("/tmp/ayah-reminder-data"))
}

/// Main config file path (`AYAH_CONFIG` or `config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    if let Some(explicit) = std::env::var_os("AYAH_CONFIG") {
        return PathBuf::from(explicit);
    }
    config_dir().join("config.toml")
}

/// Persisted key-value state file (`config_dir()/state.json`).
#[must_use]
pub fn state_file() -> PathBuf {
    config_dir().join("state.json")
}
