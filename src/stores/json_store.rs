//! Generic atomic JSON-backed store (§4.3 "Store plumbing").

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::logger::Logger;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("validation: {0}")]
    Validation(String),
}

/// One file, one value. Reads fall back to `T::default()` on a missing
/// file; an unparsable file is quarantined alongside it and treated the
/// same as missing.
pub struct JsonStore<T> {
    path: PathBuf,
    logger: Logger,
    cached: Mutex<Option<T>>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    pub fn new(path: PathBuf, logger: Logger) -> Self {
        JsonStore {
            path,
            logger,
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads from disk on first access, then serves the in-memory copy.
    /// Every mutation refreshes the cache after a successful write.
    pub fn read(&self) -> T {
        {
            let cached = self.cached.lock();
            if let Some(value) = cached.as_ref() {
                return value.clone();
            }
        }
        let value = self.load_from_disk();
        *self.cached.lock() = Some(value.clone());
        value
    }

    fn load_from_disk(&self) -> T {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                self.quarantine(&format!("read error: {e}"));
                return T::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                self.quarantine(&format!("parse error: {e}"));
                T::default()
            }
        }
    }

    fn quarantine(&self, reason: &str) {
        let epoch_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let mut quarantined = self.path.clone();
        let file_name = quarantined
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".into());
        quarantined.set_file_name(format!("{file_name}.corrupt-{epoch_ms}.bak"));

        if let Err(e) = std::fs::rename(&self.path, &quarantined) {
            self.logger.warn(
                format!("failed to quarantine corrupt store file: {e}"),
                Some(serde_json::json!({ "path": self.path.to_string_lossy(), "reason": reason })),
            );
            return;
        }
        self.logger.warn(
            "quarantined corrupt store file".to_string(),
            Some(serde_json::json!({
                "path": self.path.to_string_lossy(),
                "quarantined_as": quarantined.to_string_lossy(),
                "reason": reason,
            })),
        );
    }

    /// Serialises `value`, writes it atomically, and updates the cache.
    pub fn write(&self, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::Validation(e.to_string()))?;

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(parent)?;
        use std::io::Write;
        tmp.write_all(serialized.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        *self.cached.lock() = Some(value.clone());
        Ok(())
    }

    /// Reads, applies `mutator`, writes back, returns whatever `mutator`
    /// returns to its caller.
    pub fn update<R>(&self, mutator: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let mut value = self.read();
        let result = mutator(&mut value);
        self.write(&value)?;
        Ok(result)
    }
}

pub type SharedStore<T> = Arc<JsonStore<T>>;
