//! Persisted key/value storage
//!
//! Whole-string values under short keys. Reads and writes replace the
//! entire value, so a reader never observes a partially written one.

use crate::config::data_dir;
use crate::error::{BatchError, Result};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Minimal persisted key/value surface
pub trait KeyValueStore: Send + Sync {
    /// Current value, `None` when absent
    ///
    /// # Errors
    /// - Backing storage could not be read
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value for `key`
    ///
    /// # Errors
    /// - Backing storage could not be written
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; absent keys are not an error
    ///
    /// # Errors
    /// - Backing storage could not be modified
    fn remove(&self, key: &str) -> Result<()>;
}

/// File-backed store: one `<key>.json` file per key
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store in the default data directory
    ///
    /// Uses `BGREMOVE_BATCH_DATA_DIR` when set, otherwise the platform data
    /// directory (`~/.local/share/bgremove-batch` on Linux).
    ///
    /// # Errors
    /// - Failed to determine or create the data directory
    pub fn new() -> Result<Self> {
        Self::with_custom_dir(&data_dir()?)
    }

    /// Store in a custom directory
    ///
    /// # Errors
    /// - Failed to create the directory
    pub fn with_custom_dir(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .map_err(|e| BatchError::file_io_error("create data directory", dir, &e))?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(BatchError::storage(format!("Invalid storage key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(serde_json::from_str::<String>(&raw).map_err(|e| {
                BatchError::storage(format!("Corrupt value in {}: {}", path.display(), e))
            })?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BatchError::file_io_error("read stored value", &path, &e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let encoded = serde_json::to_string(value)?;

        // Write-then-rename so readers see either the old or the new value
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| BatchError::file_io_error("create temporary file in", &self.dir, &e))?;
        temp.write_all(encoded.as_bytes())
            .map_err(|e| BatchError::file_io_error("write temporary file for", &path, &e))?;
        temp.persist(&path)
            .map_err(|e| BatchError::file_io_error("replace stored value", &path, &e.error))?;

        tracing::debug!(key, bytes = encoded.len(), "Stored value");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(key, "Removed stored value");
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BatchError::file_io_error("remove stored value", &path, &e)),
        }
    }
}

/// In-memory store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| BatchError::storage("In-memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values()?.remove(key);
        Ok(())
    }
}
