//! Key/value persistence that survives reloads.
//!
//! The engine only ever stores small string scalars here. `FileStorage` is the
//! native stand-in for browser local storage; `MemoryStorage` backs tests and
//! embedders that bring their own persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{AppError, Result};

/// Storage keys
pub mod keys {
    pub const REFERENCE: &str = concat!("payment:", "reference");
    pub const PLAN_ID: &str = concat!("payment:", "plan_id");
    pub const STORE_ID: &str = concat!("payment:", "store_id");
    pub const STARTED_AT: &str = concat!("payment:", "started_at");
    pub const RECONCILIATION: &str = concat!("payment:", "reconciliation");
    /// Raw reference last seen on a return URL, kept for support/debugging
    pub const LAST_REFERENCE: &str = concat!("payment:", "last_reference");

    /// Keys that together make up one persisted payment session.
    pub const SESSION: [&str; 4] = [REFERENCE, PLAN_ID, STORE_ID, STARTED_AT];
}

/// Durable string store shared by every tab of the storefront.
///
/// Writes are best effort: an adapter that cannot persist logs and carries on,
/// the engine never sees the failure.
pub trait StorageAdapter: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str);

    /// Missing keys are ignored.
    fn remove(&self, key: &str);
}

/// In-memory storage. Lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageAdapter for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(key);
        }
    }
}

/// File-based storage adapter
///
/// Keeps every key in `payments.json` within the given directory and rewrites
/// the file on each change.
pub struct FileStorage {
    path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    pub const FILE_NAME: &'static str = "payments.json";

    /// Open (or start) the store in `storage_dir`, which must already exist.
    ///
    /// A corrupt file is treated as empty rather than failing startup.
    pub fn open(storage_dir: &Path) -> Result<Self> {
        if !storage_dir.is_dir() {
            return Err(AppError::BadRequest(format!(
                "storage directory does not exist: {}",
                storage_dir.display()
            )));
        }

        let path = storage_dir.join(Self::FILE_NAME);

        let cache = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "Discarding unreadable payment storage: {}", e);
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) {
        let Ok(cache) = self.cache.read() else {
            return;
        };

        let written = serde_json::to_string_pretty(&*cache)
            .map_err(AppError::from)
            .and_then(|contents| std::fs::write(&self.path, contents).map_err(AppError::from));

        if let Err(e) = written {
            tracing::warn!(path = %self.path.display(), "Failed to persist payment storage: {}", e);
        }
    }
}

impl StorageAdapter for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let cache = self.cache.read().ok()?;
        cache.get(key).map(String::from)
    }

    fn set(&self, key: &str, value: &str) {
        let changed = match self.cache.write() {
            Ok(mut cache) => match cache.get_mut(key) {
                Some(existing) if existing == value => false,
                Some(existing) => {
                    value.clone_into(existing);
                    true
                }
                None => {
                    cache.insert(key.to_owned(), value.to_owned());
                    true
                }
            },
            Err(_) => false,
        };
        if changed {
            self.flush();
        }
    }

    fn remove(&self, key: &str) {
        let removed = match self.cache.write() {
            Ok(mut cache) => cache.remove(key).is_some(),
            Err(_) => false,
        };
        if removed {
            self.flush();
        }
    }
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self.cache.read().map(|c| c.len()).unwrap_or(0);
        write!(f, "FileStorage({}, {} keys)", self.path.display(), keys)
    }
}
