//! Favourites store (§4.3, §6.3 `favorites.json` — a bare `string[]`).

use std::path::PathBuf;
use std::sync::Arc;

use super::json_store::{JsonStore, StoreError};
use crate::logger::Logger;

pub struct Favorites {
    store: Arc<JsonStore<Vec<String>>>,
}

impl Favorites {
    pub fn new(path: PathBuf, logger: Logger) -> Self {
        Favorites {
            store: Arc::new(JsonStore::new(path, logger)),
        }
    }

    pub fn list(&self) -> Vec<String> {
        self.store.read()
    }

    /// Appends `path` if not already present. Rejects empty input.
    pub fn add(&self, path: &str) -> Result<(), StoreError> {
        if path.trim().is_empty() {
            return Err(StoreError::Validation("path must not be empty".into()));
        }
        self.store.update(|paths| {
            if !paths.iter().any(|p| p == path) {
                paths.push(path.to_string());
            }
        })?;
        Ok(())
    }

    pub fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.store.update(|paths| {
            paths.retain(|p| p != path);
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LoggerSink;

    fn logger() -> Logger {
        Logger::new("test", LoggerSink::new())
    }

    #[test]
    fn add_deduplicates_preserving_order() {
        let dir = tempfile::tempdir().unwrap();
        let fav = Favorites::new(dir.path().join("favorites.json"), logger());
        fav.add("/a").unwrap();
        fav.add("/b").unwrap();
        fav.add("/a").unwrap();
        assert_eq!(fav.list(), vec!["/a", "/b"]);
    }

    #[test]
    fn add_rejects_empty() {
        let dir = tempfile::tempdir().unwrap();
        let fav = Favorites::new(dir.path().join("favorites.json"), logger());
        assert!(matches!(fav.add("   "), Err(StoreError::Validation(_))));
    }

    #[test]
    fn remove_drops_entry() {
        let dir = tempfile::tempdir().unwrap();
        let fav = Favorites::new(dir.path().join("favorites.json"), logger());
        fav.add("/a").unwrap();
        fav.add("/b").unwrap();
        fav.remove("/a").unwrap();
        assert_eq!(fav.list(), vec!["/b"]);
    }

    #[test]
    fn on_disk_shape_is_a_bare_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.json");
        let fav = Favorites::new(path.clone(), logger());
        fav.add("/a").unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.is_array());
    }
}
