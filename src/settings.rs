//! Application settings storage
//!
//! Stores the server URL, the bearer credential and the polling knobs in a
//! JSON file in the app data directory. The credential is an opaque string —
//! issuing it (Google sign-in + JWT) happens outside this crate.

use crate::store::SyncConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

/// Global settings instance
static SETTINGS: RwLock<Option<Settings>> = RwLock::new(None);

/// Path to config file (set during init)
static CONFIG_PATH: RwLock<Option<PathBuf>> = RwLock::new(None);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Opaque bearer credential. Discarded on 401 or logout.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Sidebar / canvas poll cadence.
    #[serde(default = "default_poll_secs")]
    pub poll_interval_secs: u64,
    /// Detail view polls tighter to reflect chat-driven score changes.
    #[serde(default = "default_detail_poll_secs")]
    pub detail_poll_interval_secs: u64,
    #[serde(default = "default_ttl_secs")]
    pub progress_ttl_secs: u64,
}

fn default_server_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_poll_secs() -> u64 {
    3
}

fn default_detail_poll_secs() -> u64 {
    1
}

fn default_ttl_secs() -> u64 {
    2
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            access_token: None,
            poll_interval_secs: default_poll_secs(),
            detail_poll_interval_secs: default_detail_poll_secs(),
            progress_ttl_secs: default_ttl_secs(),
        }
    }
}

impl Settings {
    /// Load settings from disk or create default
    fn load(path: &PathBuf) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(contents) => match serde_json::from_str(&contents) {
                    Ok(settings) => return settings,
                    Err(e) => eprintln!("[SETTINGS] failed to parse {:?}: {}", path, e),
                },
                Err(e) => eprintln!("[SETTINGS] failed to read {:?}: {}", path, e),
            }
        }
        Settings::default()
    }

    fn save(&self, path: &PathBuf) {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    eprintln!("[SETTINGS] failed to write {:?}: {}", path, e);
                }
            }
            Err(e) => eprintln!("[SETTINGS] failed to serialize: {}", e),
        }
    }

    /// Engine windows derived from the stored knobs. Suppression matches the
    /// TTL (both guard the same 2-second race); the notification display
    /// window stays fixed.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            ttl: Duration::from_secs(self.progress_ttl_secs),
            suppression_window: Duration::from_secs(self.progress_ttl_secs),
            ..SyncConfig::default()
        }
    }
}

/// Initialize settings with the given config directory. Must be called once
/// at startup before `get`/`update`.
pub fn init(config_dir: PathBuf) {
    let path = config_dir.join("curio-settings.json");
    let settings = Settings::load(&path);
    *CONFIG_PATH.write().unwrap() = Some(path);
    *SETTINGS.write().unwrap() = Some(settings);
}

/// Default config directory under the platform data dir.
pub fn default_config_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("com.curio.app"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Current settings (default if `init` was never called).
pub fn get() -> Settings {
    SETTINGS.read().unwrap().clone().unwrap_or_default()
}

/// Mutate settings and persist the result.
pub fn update(f: impl FnOnce(&mut Settings)) {
    let mut guard = SETTINGS.write().unwrap();
    let mut settings = guard.clone().unwrap_or_default();
    f(&mut settings);
    if let Some(path) = CONFIG_PATH.read().unwrap().as_ref() {
        settings.save(path);
    }
    *guard = Some(settings);
}

/// Store a new credential.
pub fn set_access_token(token: &str) {
    update(|s| s.access_token = Some(token.to_string()));
}

/// Discard the credential (logout or 401).
pub fn clear_access_token() {
    update(|s| s.access_token = None);
}
