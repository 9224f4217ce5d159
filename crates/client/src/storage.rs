//! Durable client storage.
//!
//! String keys with string or JSON-serialized values, the same layout a
//! browser client keeps in `localStorage`:
//! - `token`: bearer credential (its absence means "logged out")
//! - `userType`: `user` | `captain`
//! - `user` / `captain`: serialized profile, mutually exclusive by role
//!
//! On desktop the values live as files in the platform config directory:
//!   - Linux: `~/.config/ridewave/`
//!   - macOS: `~/Library/Application Support/ridewave/`
//!   - Windows: `%APPDATA%\ridewave\`

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};

pub const TOKEN_KEY: &str = "token";
pub const ROLE_KEY: &str = "userType";
pub const RIDER_PROFILE_KEY: &str = "user";
pub const CAPTAIN_PROFILE_KEY: &str = "captain";

pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    /// Returns `true` if the value was written.
    fn set(&self, key: &str, value: &str) -> bool;
    fn remove(&self, key: &str);

    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Save a value as JSON. Returns `true` if the operation succeeded.
pub fn save_json<T: Serialize>(storage: &dyn Storage, key: &str, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => storage.set(key, &json),
        Err(_) => false,
    }
}

/// Load a JSON value. `None` if the key doesn't exist or deserialization fails.
pub fn load_json<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Option<T> {
    let json = storage.get(key)?;
    serde_json::from_str(&json).ok()
}

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform config directory, `None` when the platform has none.
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|d| Self::new(d.join("ridewave")))
    }

    fn file_path(&self, key: &str) -> Option<PathBuf> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).ok()?;
        }
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        Some(self.dir.join(format!("{}.json", safe_key)))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.file_path(key)?;
        std::fs::read_to_string(path).ok()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        let Some(path) = self.file_path(key) else {
            return false;
        };
        std::fs::write(path, value).is_ok()
    }

    fn remove(&self, key: &str) {
        if let Some(path) = self.file_path(key) {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Process-local storage for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        match self.values.lock() {
            Ok(mut values) => {
                values.insert(key.to_string(), value.to_string());
                true
            }
            Err(_) => false,
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
    }
}
