//! Request dispatcher (§4.5): schema-validated, stateless translation from
//! channel name + arguments to engine/store calls and a plain JSON
//! response envelope.
//!
//! Grounded on the host's `AppResult<T> = Result<T, String>` boundary
//! convention in `main.rs` — Tauri commands must return `Serialize`
//! values, so rich error types stop here and become `{success, ..}` JSON.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::engine::{EngineError, ScanEngine, ScanId, ScanObserver, ScanOptions};
use crate::logger::Logger;
use crate::path_guard;
use crate::stores::{Favorites, RecentScans, Settings};

#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError { field: field.into(), message: message.into() }
    }
}

/// Closed schema DSL (§4.5, §9 "dynamic schema DSL → tagged variants").
#[derive(Debug, Clone)]
pub enum Schema {
    String { non_empty: bool, no_traversal: bool, secure_path: bool, optional: bool },
    Number { min: Option<f64>, max: Option<f64>, optional: bool },
    Boolean { optional: bool },
    Enum { values: Vec<String>, optional: bool },
    Array { items: Box<Schema>, optional: bool },
    Tuple { items: Vec<Schema>, optional: bool },
    Record { values: Option<Box<Schema>>, optional: bool },
    Object { props: Vec<(String, Schema)>, allow_unknown: bool, optional: bool },
}

impl Schema {
    pub fn string() -> Self {
        Schema::String { non_empty: false, no_traversal: false, secure_path: false, optional: false }
    }
    pub fn non_empty(mut self) -> Self {
        if let Schema::String { non_empty, .. } = &mut self {
            *non_empty = true;
        }
        self
    }
    pub fn secure_path(mut self) -> Self {
        if let Schema::String { secure_path, non_empty, .. } = &mut self {
            *secure_path = true;
            *non_empty = true;
        }
        self
    }
    pub fn optional(mut self) -> Self {
        match &mut self {
            Schema::String { optional, .. }
            | Schema::Number { optional, .. }
            | Schema::Boolean { optional }
            | Schema::Enum { optional, .. }
            | Schema::Array { optional, .. }
            | Schema::Tuple { optional, .. }
            | Schema::Record { optional, .. }
            | Schema::Object { optional, .. } => *optional = true,
        }
        self
    }

    fn is_optional(&self) -> bool {
        match self {
            Schema::String { optional, .. }
            | Schema::Number { optional, .. }
            | Schema::Boolean { optional }
            | Schema::Enum { optional, .. }
            | Schema::Array { optional, .. }
            | Schema::Tuple { optional, .. }
            | Schema::Record { optional, .. }
            | Schema::Object { optional, .. } => *optional,
        }
    }
}

/// Validates `value` against `schema`, collecting every violation rather
/// than stopping at the first (§4.5 "this expansion").
pub fn validate(value: Option<&Value>, schema: &Schema, field: &str, base: &Path) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let value = match value {
        Some(v) if !v.is_null() => v,
        _ => {
            if !schema.is_optional() {
                errors.push(ValidationError::new(field, "required"));
            }
            return errors;
        }
    };

    match schema {
        Schema::String { non_empty, no_traversal, secure_path, .. } => match value.as_str() {
            Some(s) => {
                if *non_empty && s.trim().is_empty() {
                    errors.push(ValidationError::new(field, "must not be empty"));
                }
                if *no_traversal && !path_guard::safe_relative(s) {
                    errors.push(ValidationError::new(field, "must not contain traversal segments"));
                }
                if *secure_path && !path_guard::safe_path(s, base) {
                    errors.push(ValidationError::new(field, "path is not permitted"));
                }
            }
            None => errors.push(ValidationError::new(field, "must be a string")),
        },
        Schema::Number { min, max, .. } => match value.as_f64() {
            Some(n) => {
                if let Some(min) = min {
                    if n < *min {
                        errors.push(ValidationError::new(field, format!("must be >= {min}")));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        errors.push(ValidationError::new(field, format!("must be <= {max}")));
                    }
                }
            }
            None => errors.push(ValidationError::new(field, "must be a number")),
        },
        Schema::Boolean { .. } => {
            if value.as_bool().is_none() {
                errors.push(ValidationError::new(field, "must be a boolean"));
            }
        }
        Schema::Enum { values, .. } => match value.as_str() {
            Some(s) if values.iter().any(|v| v == s) => {}
            _ => errors.push(ValidationError::new(field, format!("must be one of {values:?}"))),
        },
        Schema::Array { items, .. } => match value.as_array() {
            Some(arr) => {
                for (i, item) in arr.iter().enumerate() {
                    errors.extend(validate(Some(item), items, &format!("{field}[{i}]"), base));
                }
            }
            None => errors.push(ValidationError::new(field, "must be an array")),
        },
        Schema::Tuple { items, .. } => match value.as_array() {
            Some(arr) if arr.len() == items.len() => {
                for (i, (item, item_schema)) in arr.iter().zip(items.iter()).enumerate() {
                    errors.extend(validate(Some(item), item_schema, &format!("{field}[{i}]"), base));
                }
            }
            _ => errors.push(ValidationError::new(field, format!("must be a tuple of length {}", items.len()))),
        },
        Schema::Record { values, .. } => match value.as_object() {
            Some(obj) => {
                if let Some(value_schema) = values {
                    for (k, v) in obj {
                        errors.extend(validate(Some(v), value_schema, &format!("{field}.{k}"), base));
                    }
                }
            }
            None => errors.push(ValidationError::new(field, "must be a record")),
        },
        Schema::Object { props, allow_unknown, .. } => match value.as_object() {
            Some(obj) => {
                for (key, prop_schema) in props {
                    errors.extend(validate(obj.get(key), prop_schema, &format!("{field}.{key}"), base));
                }
                if !allow_unknown {
                    let known: HashSet<&str> = props.iter().map(|(k, _)| k.as_str()).collect();
                    for key in obj.keys() {
                        if !known.contains(key.as_str()) {
                            errors.push(ValidationError::new(format!("{field}.{key}"), "unknown field"));
                        }
                    }
                }
            }
            None => errors.push(ValidationError::new(field, "must be an object")),
        },
    }
    errors
}

fn validation_response(errors: Vec<ValidationError>) -> Value {
    json!({ "success": false, "error": "validation", "details": errors })
}

/// Shared handles every `handle_*` function operates against. One
/// instance lives inside the app's managed state.
pub struct Dispatcher {
    pub engine: Arc<ScanEngine>,
    pub favorites: Arc<Favorites>,
    pub recent: Arc<RecentScans>,
    pub settings: Arc<Settings>,
    pub logger: Logger,
    pub guard_base: PathBuf,
    active_scans: Mutex<Vec<ScanId>>,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<ScanEngine>,
        favorites: Arc<Favorites>,
        recent: Arc<RecentScans>,
        settings: Arc<Settings>,
        logger: Logger,
        guard_base: PathBuf,
    ) -> Self {
        Dispatcher {
            engine,
            favorites,
            recent,
            settings,
            logger,
            guard_base,
            active_scans: Mutex::new(Vec::new()),
        }
    }

    /// `scan:start` — cancels every tracked active scan first (single-
    /// active-scan enforcement), then registers the new one.
    pub fn handle_scan_start(&self, root: &str, options: Option<Value>, observer: Arc<dyn ScanObserver>) -> Value {
        let errors = validate(Some(&json!(root)), &Schema::string().non_empty(), "root", &self.guard_base);
        if !errors.is_empty() {
            return validation_response(errors);
        }

        let options: ScanOptions = match options {
            Some(v) => match serde_json::from_value(v) {
                Ok(o) => o,
                Err(e) => {
                    return validation_response(vec![ValidationError::new("options", e.to_string())]);
                }
            },
            None => ScanOptions::default(),
        };

        {
            let mut active = self.active_scans.lock();
            for scan_id in active.drain(..) {
                self.engine.cancel(&scan_id);
            }
        }

        match self.engine.start(Path::new(root), options, observer) {
            Ok(started) => {
                self.active_scans.lock().push(started.scan_id.clone());
                let _ = self.recent.touch(root);
                json!({
                    "success": true,
                    "scanId": started.scan_id,
                    "options": started.options,
                    "startedAt": started
                        .started_at
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_millis() as u64)
                        .unwrap_or(0),
                })
            }
            Err(EngineError::InvalidRoot) => json!({ "success": false, "error": "invalid-root" }),
            Err(EngineError::NotADirectory) => json!({ "success": false, "error": "not-a-directory" }),
        }
    }

    pub fn handle_scan_cancel(&self, scan_id: &str) -> Value {
        if self.engine.state_of(scan_id).is_none() {
            return json!({ "success": false, "error": "unknown-id" });
        }
        self.engine.cancel(scan_id);
        self.active_scans.lock().retain(|id| id != scan_id);
        json!({ "success": true })
    }

    pub fn handle_scan_state(&self, scan_id: &str) -> Value {
        match self.engine.state_of(scan_id) {
            Some(snapshot) => json!({ "success": true, "state": snapshot }),
            None => json!({ "success": false, "error": "not-found" }),
        }
    }

    pub fn handle_favorites_list(&self) -> Value {
        json!({ "success": true, "favorites": self.favorites.list() })
    }

    pub fn handle_favorites_add(&self, path: &str) -> Value {
        let errors = validate(Some(&json!(path)), &Schema::string().secure_path(), "path", &self.guard_base);
        if !errors.is_empty() {
            return validation_response(errors);
        }
        match self.favorites.add(path) {
            Ok(()) => json!({ "success": true, "favorites": self.favorites.list() }),
            Err(e) => validation_response(vec![ValidationError::new("path", e.to_string())]),
        }
    }

    pub fn handle_favorites_remove(&self, path: &str) -> Value {
        let errors = validate(Some(&json!(path)), &Schema::string().secure_path(), "path", &self.guard_base);
        if !errors.is_empty() {
            return validation_response(errors);
        }
        match self.favorites.remove(path) {
            Ok(()) => json!({ "success": true, "favorites": self.favorites.list() }),
            Err(e) => validation_response(vec![ValidationError::new("path", e.to_string())]),
        }
    }

    pub fn handle_recent_list(&self) -> Value {
        let (recent, max) = self.recent.list();
        json!({ "success": true, "recent": recent, "max": max })
    }

    pub fn handle_recent_clear(&self) -> Value {
        let _ = self.recent.clear();
        json!({ "success": true, "recent": Vec::<String>::new() })
    }

    pub fn handle_settings_get(&self) -> Value {
        json!({ "success": true, "settings": self.settings.get(), "file": self.settings.path().to_string_lossy() })
    }

    pub fn handle_settings_update(&self, patch: Value) -> Value {
        let patch_obj = match patch.as_object() {
            Some(obj) => obj.clone(),
            None => return validation_response(vec![ValidationError::new("patch", "must be a record")]),
        };
        match self.settings.update(patch_obj) {
            Ok(settings) => json!({ "success": true, "settings": settings }),
            Err(e) => validation_response(vec![ValidationError::new("patch", e.to_string())]),
        }
    }

    pub fn handle_rename_path(&self, old_path: &str, new_name: &str) -> Value {
        let mut errors = validate(Some(&json!(old_path)), &Schema::string().secure_path(), "oldPath", &self.guard_base);
        errors.extend(validate(Some(&json!(new_name)), &Schema::string().non_empty(), "newName", &self.guard_base));
        if !errors.is_empty() {
            return validation_response(errors);
        }

        let old = Path::new(old_path);
        let new_path = match old.parent() {
            Some(parent) => parent.join(new_name),
            None => return validation_response(vec![ValidationError::new("oldPath", "has no parent")]),
        };

        match std::fs::rename(old, &new_path) {
            Ok(()) => json!({ "success": true, "newPath": new_path.to_string_lossy() }),
            Err(e) => {
                let code = crate::engine::classify_io_error(&e);
                json!({ "success": false, "error": e.to_string(), "errorCode": code.to_string() })
            }
        }
    }

    pub fn handle_delete_path(&self, path: &str) -> Value {
        let errors = validate(Some(&json!(path)), &Schema::string().secure_path(), "path", &self.guard_base);
        if !errors.is_empty() {
            return validation_response(errors);
        }
        match trash::delete(path) {
            Ok(()) => json!({ "success": true }),
            Err(e) => json!({ "success": false, "error": e.to_string(), "errorCode": "UNKNOWN" }),
        }
    }

    pub fn handle_logs_recent(&self, limit: u32) -> Value {
        let errors = validate(Some(&json!(limit)), &Schema::Number { min: Some(1.0), max: Some(500.0), optional: false }, "limit", &self.guard_base);
        if !errors.is_empty() {
            return validation_response(errors);
        }
        let logs = self.logger.recent(limit as usize);
        json!({ "success": true, "logs": logs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_schema_rejects_empty() {
        let errors = validate(Some(&json!("")), &Schema::string().non_empty(), "path", Path::new("/base"));
        assert!(!errors.is_empty());
    }

    #[test]
    fn string_schema_accepts_nonempty() {
        let errors = validate(Some(&json!("a/b")), &Schema::string().non_empty(), "path", Path::new("/base"));
        assert!(errors.is_empty());
    }

    #[test]
    fn secure_path_rejects_traversal() {
        let errors = validate(Some(&json!("../escape")), &Schema::string().secure_path(), "path", Path::new("/base"));
        assert!(!errors.is_empty());
    }

    #[test]
    fn optional_field_skips_when_missing() {
        let errors = validate(None, &Schema::string().non_empty().optional(), "path", Path::new("/base"));
        assert!(errors.is_empty());
    }

    #[test]
    fn object_schema_collects_all_violations() {
        let schema = Schema::Object {
            props: vec![
                ("a".to_string(), Schema::string().non_empty()),
                ("b".to_string(), Schema::Number { min: Some(0.0), max: None, optional: false }),
            ],
            allow_unknown: false,
            optional: false,
        };
        let value = json!({ "a": "", "b": "not a number", "c": "unknown" });
        let errors = validate(Some(&value), &schema, "root", Path::new("/base"));
        assert_eq!(errors.len(), 3);
    }
}
