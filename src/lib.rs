//! Crate root: wires the scan engine, stores, logger, and dispatcher into
//! a Tauri application, mirroring the host's own `AppState`/`setup_app`/
//! `run` split at the bottom of `main.rs`.

pub mod dispatcher;
pub mod engine;
pub mod logger;
pub mod path_guard;
pub mod stores;

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tauri::{AppHandle, Emitter, Manager, State};

use dispatcher::Dispatcher;
use engine::{ScanEngine, ScanEvent, ScanObserver};
use logger::{Logger, LoggerSink};
use stores::{Favorites, RecentScans, Settings};

/// Forwards scan events to the frontend via `tauri::Emitter::emit`,
/// exactly as the host's `emit_index_state`/`emit_progress` helpers do.
struct TauriScanObserver {
    app: AppHandle,
}

impl ScanObserver for TauriScanObserver {
    fn emit(&self, event: ScanEvent) {
        let name = match &event {
            ScanEvent::Registered { .. } => "scan:registered",
            ScanEvent::Started { .. } => "scan:started",
            ScanEvent::Progress { .. } => "scan:progress",
            ScanEvent::Partial { .. } => "scan:partial",
            ScanEvent::Done { .. } => "scan:done",
        };
        let _ = self.app.emit(name, event);
    }
}

/// Forwards settings-change notifications to the frontend as
/// `settings:updated`.
struct TauriSettingsObserver {
    app: AppHandle,
}

impl stores::SettingsObserver for TauriSettingsObserver {
    fn on_settings_changed(&self, settings: &stores::UserSettings) {
        let _ = self.app.emit("settings:updated", settings);
    }
}

#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
}

fn app_data_paths(app: &tauri::App) -> Result<PathBuf, String> {
    let dir = app
        .path()
        .app_data_dir()
        .map_err(|e| format!("failed to get app data dir: {e}"))?;
    std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
    Ok(dir)
}

fn setup_app(app: &mut tauri::App) -> Result<(), String> {
    let app_data_dir = app_data_paths(app)?;

    let sink = LoggerSink::new();
    sink.enable_file_sink(&app_data_dir, "app.ndjson");
    logger::install_subscriber(sink.clone());

    let engine_logger = Logger::new("engine", sink.clone());
    let store_logger = Logger::new("store", sink.clone());
    let dispatcher_logger = Logger::new("dispatcher", sink.clone());

    let engine = Arc::new(ScanEngine::new(engine_logger));
    let favorites = Arc::new(Favorites::new(app_data_dir.join("favorites.json"), store_logger.clone()));
    let recent = Arc::new(RecentScans::new(app_data_dir.join("recent-scans.json"), store_logger.clone()));
    let settings = Arc::new(Settings::new(app_data_dir.join("user-settings.json"), store_logger));

    settings.subscribe(Arc::new(TauriSettingsObserver { app: app.handle().clone() }));
    let _ = app.handle().emit("settings:loaded", settings.get());

    let dispatcher = Arc::new(Dispatcher::new(
        engine,
        favorites,
        recent,
        settings,
        dispatcher_logger,
        app_data_dir,
    ));

    app.manage(AppState { dispatcher });
    Ok(())
}

#[tauri::command]
fn scan_start(app: AppHandle, state: State<AppState>, root: String, options: Option<Value>) -> Value {
    let observer = Arc::new(TauriScanObserver { app });
    state.dispatcher.handle_scan_start(&root, options, observer)
}

#[tauri::command]
fn scan_cancel(state: State<AppState>, scan_id: String) -> Value {
    state.dispatcher.handle_scan_cancel(&scan_id)
}

#[tauri::command]
fn scan_state(state: State<AppState>, scan_id: String) -> Value {
    state.dispatcher.handle_scan_state(&scan_id)
}

#[tauri::command]
fn favorites_list(state: State<AppState>) -> Value {
    state.dispatcher.handle_favorites_list()
}

#[tauri::command]
fn favorites_add(state: State<AppState>, path: String) -> Value {
    state.dispatcher.handle_favorites_add(&path)
}

#[tauri::command]
fn favorites_remove(state: State<AppState>, path: String) -> Value {
    state.dispatcher.handle_favorites_remove(&path)
}

#[tauri::command]
fn recent_list(state: State<AppState>) -> Value {
    state.dispatcher.handle_recent_list()
}

#[tauri::command]
fn recent_clear(state: State<AppState>) -> Value {
    state.dispatcher.handle_recent_clear()
}

#[tauri::command]
fn settings_get(state: State<AppState>) -> Value {
    state.dispatcher.handle_settings_get()
}

#[tauri::command]
fn settings_update(state: State<AppState>, patch: Value) -> Value {
    state.dispatcher.handle_settings_update(patch)
}

#[tauri::command]
fn rename_path(state: State<AppState>, old_path: String, new_name: String) -> Value {
    state.dispatcher.handle_rename_path(&old_path, &new_name)
}

#[tauri::command]
fn delete_path(state: State<AppState>, path: String) -> Value {
    state.dispatcher.handle_delete_path(&path)
}

#[tauri::command]
fn logs_recent(state: State<AppState>, limit: u32) -> Value {
    state.dispatcher.handle_logs_recent(limit)
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .setup(|app| {
            setup_app(app).map_err(|e| Box::<dyn std::error::Error>::from(std::io::Error::new(std::io::ErrorKind::Other, e)))
        })
        .invoke_handler(tauri::generate_handler![
            scan_start,
            scan_cancel,
            scan_state,
            favorites_list,
            favorites_add,
            favorites_remove,
            recent_list,
            recent_clear,
            settings_get,
            settings_update,
            rename_path,
            delete_path,
            logs_recent,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
