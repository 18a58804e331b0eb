//! Key-value persistence backends for the token store

use crate::error::{ClientError, Result};
use directories::ProjectDirs;
use papaya::HashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Client-local key-value storage
///
/// Reads never fail: an unreadable entry is reported as absent.
pub trait KeyValueStorage: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Remove several keys; backends that persist should do it in one write
    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        keys.iter().try_for_each(|key| self.remove(key))
    }
}

/// In-memory storage using Papaya HashMap
#[derive(Clone)]
pub struct MemoryStorage {
    entries: Arc<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.pin().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.pin().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.pin().remove(key);
        Ok(())
    }
}

/// Storage backed by one JSON object file
///
/// Every write rewrites the whole file through a temp file and a rename,
/// so a crash never leaves a half-written file behind.
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Storage file under the platform data directory
    pub fn default_location() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "huaan", "huaan-client").ok_or_else(|| {
            ClientError::Storage("could not determine platform data directory".to_string())
        })?;
        Ok(Self::open(dirs.data_dir().join("session.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "Failed to read storage file");
                }
                return BTreeMap::new();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Storage file is corrupt, treating as empty");
            BTreeMap::new()
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec_pretty(entries)?)?;

        // Owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), keys = entries.len(), "Storage file written");
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all();
        apply(&mut entries);
        self.write_all(&entries)
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_all().remove(key)
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        self.update(|entries| {
            for key in keys {
                entries.remove(*key);
            }
        })
    }
}
