//! User settings store (§4.3, §6.1 `settings:get`/`settings:update`).

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Map;

use super::json_store::{JsonStore, StoreError};
use crate::logger::Logger;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDefaults {
    pub max_entries: u64,
    pub aggregation_threshold: u64,
}

impl Default for ScanDefaults {
    fn default() -> Self {
        ScanDefaults { max_entries: 1000, aggregation_threshold: 10 }
    }
}

/// Recognised top-level keys plus a flattened bag for anything else, so
/// that fields unknown to this build round-trip untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub version: u32,
    pub theme: String,
    pub default_scan: ScanDefaults,
    #[serde(flatten)]
    pub extra: Map<String, serde_json::Value>,
}

impl Default for UserSettings {
    fn default() -> Self {
        UserSettings {
            version: 1,
            theme: "light".to_string(),
            default_scan: ScanDefaults::default(),
            extra: Map::new(),
        }
    }
}

/// Observer notified with the full settings record after every `update`.
pub trait SettingsObserver: Send + Sync {
    fn on_settings_changed(&self, settings: &UserSettings);
}

pub struct Settings {
    store: Arc<JsonStore<UserSettings>>,
    observers: Mutex<Vec<Arc<dyn SettingsObserver>>>,
}

impl Settings {
    pub fn new(path: PathBuf, logger: Logger) -> Self {
        Settings {
            store: Arc::new(JsonStore::new(path, logger)),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn SettingsObserver>) {
        self.observers.lock().push(observer);
    }

    pub fn get(&self) -> UserSettings {
        self.store.read()
    }

    pub fn path(&self) -> &std::path::Path {
        self.store.path()
    }

    /// Shallow top-level merge of `patch` onto the current record, then
    /// notifies observers with the result.
    pub fn update(&self, patch: Map<String, serde_json::Value>) -> Result<UserSettings, StoreError> {
        let updated = self.store.update(|current| {
            let mut merged = serde_json::to_value(&*current).unwrap_or_default();
            if let serde_json::Value::Object(obj) = &mut merged {
                for (k, v) in patch {
                    obj.insert(k, v);
                }
            }
            if let Ok(parsed) = serde_json::from_value::<UserSettings>(merged) {
                *current = parsed;
            }
        })?;
        let _ = updated;
        let result = self.store.read();
        for observer in self.observers.lock().iter() {
            observer.on_settings_changed(&result);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LoggerSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn logger() -> Logger {
        Logger::new("test", LoggerSink::new())
    }

    #[test]
    fn get_returns_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(dir.path().join("user-settings.json"), logger());
        let s = settings.get();
        assert_eq!(s.version, 1);
        assert_eq!(s.theme, "light");
        assert_eq!(s.default_scan.max_entries, 1000);
    }

    #[test]
    fn update_merges_shallow_and_notifies() {
        struct Counter(AtomicUsize);
        impl SettingsObserver for Counter {
            fn on_settings_changed(&self, _settings: &UserSettings) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(dir.path().join("user-settings.json"), logger());
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        settings.subscribe(counter.clone());

        let mut patch = Map::new();
        patch.insert("theme".into(), serde_json::json!("dark"));
        let result = settings.update(patch).unwrap();

        assert_eq!(result.theme, "dark");
        assert_eq!(result.version, 1);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_keys_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(dir.path().join("user-settings.json"), logger());

        let mut patch = Map::new();
        patch.insert("experimentalFlag".into(), serde_json::json!(true));
        settings.update(patch).unwrap();

        let reloaded = settings.get();
        assert_eq!(reloaded.extra.get("experimentalFlag"), Some(&serde_json::json!(true)));
    }
}
