//! Recent-scans MRU store (§4.3, §6.1 `recent-scans.json` shape).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::json_store::{JsonStore, StoreError};
use crate::logger::Logger;

const DEFAULT_MAX: usize = 5;

fn default_max() -> usize {
    DEFAULT_MAX
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecentFile {
    #[serde(default = "default_max")]
    max: usize,
    #[serde(default, rename = "items")]
    items: Vec<String>,
}

impl Default for RecentFile {
    fn default() -> Self {
        RecentFile { max: DEFAULT_MAX, items: Vec::new() }
    }
}

pub struct RecentScans {
    store: Arc<JsonStore<RecentFile>>,
    exists: Box<dyn Fn(&str) -> bool + Send + Sync>,
}

impl RecentScans {
    pub fn new(path: PathBuf, logger: Logger) -> Self {
        RecentScans {
            store: Arc::new(JsonStore::new(path, logger)),
            exists: Box::new(|p| Path::new(p).exists()),
        }
    }

    /// Overrides the existence check used by [`RecentScans::list`]. Tests
    /// inject a stub so pruning doesn't depend on real filesystem state.
    pub fn with_existence_check(mut self, check: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.exists = Box::new(check);
        self
    }

    /// Returns the list, lazily dropping entries that no longer exist and
    /// rewriting the file if anything was pruned.
    pub fn list(&self) -> (Vec<String>, usize) {
        let file = self.store.read();
        let pruned: Vec<String> = file.items.iter().filter(|p| (self.exists)(p)).cloned().collect();
        if pruned.len() != file.items.len() {
            let _ = self.store.write(&RecentFile { max: file.max, items: pruned.clone() });
        }
        (pruned, file.max)
    }

    pub fn touch(&self, path: &str) -> Result<(), StoreError> {
        self.store.update(|file| {
            file.items.retain(|p| p != path);
            file.items.insert(0, path.to_string());
            file.items.truncate(file.max);
        })?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.update(|file| {
            file.items.clear();
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
    fn touch_dedups_and_prepends() {
        let dir = tempfile::tempdir().unwrap();
        let recent = RecentScans::new(dir.path().join("recent-scans.json"), logger())
            .with_existence_check(|_| true);
        recent.touch("A").unwrap();
        recent.touch("B").unwrap();
        recent.touch("A").unwrap();
        let (items, _) = recent.list();
        assert_eq!(items, vec!["A", "B"]);
    }

    #[test]
    fn touch_evicts_tail_past_cap() {
        let dir = tempfile::tempdir().unwrap();
        let recent = RecentScans::new(dir.path().join("recent-scans.json"), logger())
            .with_existence_check(|_| true);
        for p in ["A", "B", "C", "D", "E", "F"] {
            recent.touch(p).unwrap();
        }
        let (items, max) = recent.list();
        assert_eq!(max, DEFAULT_MAX);
        assert_eq!(items.len(), DEFAULT_MAX);
        assert_eq!(items[0], "F");
        assert!(!items.contains(&"A".to_string()));
    }

    #[test]
    fn list_prunes_nonexistent_entries() {
        let dir = tempfile::tempdir().unwrap();
        let recent = RecentScans::new(dir.path().join("recent-scans.json"), logger())
            .with_existence_check(|p| p != "/gone");
        recent.touch("/gone").unwrap();
        recent.touch("/here").unwrap();
        let (items, _) = recent.list();
        assert_eq!(items, vec!["/here"]);
    }

    #[test]
    fn clear_empties_list() {
        let dir = tempfile::tempdir().unwrap();
        let recent = RecentScans::new(dir.path().join("recent-scans.json"), logger())
            .with_existence_check(|_| true);
        recent.touch("A").unwrap();
        recent.clear().unwrap();
        assert!(recent.list().0.is_empty());
    }
}
