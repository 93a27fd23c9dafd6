//! Structured logger (§4.4): component-tagged levels over `tracing`, a
//! bounded in-memory ring buffer, and an optional ndjson file sink.
//!
//! Grounded on `spacedriveapp-spacedrive`'s `apps/tauri/src-tauri/src/main.rs`,
//! the pack's own example of wiring `tracing`/`tracing-subscriber` into a
//! Tauri app, in place of the host's bare `eprintln!("[tag] ...")` calls.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const RING_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn from_tracing(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: Level,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

fn iso_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

struct RingBuffer {
    records: VecDeque<LogRecord>,
}

impl RingBuffer {
    fn push(&mut self, record: LogRecord) {
        if self.records.len() >= RING_CAPACITY {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    fn recent(&self, limit: usize) -> Vec<LogRecord> {
        if limit == 0 {
            return Vec::new();
        }
        let take = limit.min(RING_CAPACITY).min(self.records.len());
        self.records.iter().rev().take(take).rev().cloned().collect()
    }
}

struct FileSink {
    path: PathBuf,
}

impl FileSink {
    fn write(&self, record: &LogRecord) {
        let line = match serde_json::to_string(record) {
            Ok(l) => l,
            Err(_) => return,
        };
        if let Some(parent) = self.path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                eprintln!("[logger] failed to create log directory {}", parent.display());
                return;
            }
        }
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            eprintln!("[logger] failed to write log record: {e}");
        }
    }
}

/// Shared sink: ring buffer plus an optional file sink. One instance per
/// process, held behind an `Arc` by every `Logger` handle.
pub struct LoggerSink {
    ring: Mutex<RingBuffer>,
    file_sink: Mutex<Option<FileSink>>,
}

impl LoggerSink {
    pub fn new() -> Arc<Self> {
        Arc::new(LoggerSink {
            ring: Mutex::new(RingBuffer {
                records: VecDeque::with_capacity(RING_CAPACITY),
            }),
            file_sink: Mutex::new(None),
        })
    }

    /// Enables the ndjson file sink. Creates the directory if absent.
    pub fn enable_file_sink(&self, dir: &std::path::Path, filename: &str) {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("[logger] failed to create log directory {}: {e}", dir.display());
            return;
        }
        *self.file_sink.lock() = Some(FileSink { path: dir.join(filename) });
    }

    pub fn record(&self, record: LogRecord) {
        if let Some(sink) = self.file_sink.lock().as_ref() {
            sink.write(&record);
        }
        self.ring.lock().push(record);
    }

    pub fn recent(&self, limit: usize) -> Vec<LogRecord> {
        self.ring.lock().recent(limit)
    }
}

/// A `tracing_subscriber::Layer` that captures every event emitted through
/// this crate's `component`-tagged macros into the shared [`LoggerSink`].
struct RingBufferLayer {
    sink: Arc<LoggerSink>,
}

struct DetailVisitor {
    message: String,
    component: Option<String>,
    detail: Option<serde_json::Value>,
}

impl tracing::field::Visit for DetailVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "component" => self.component = Some(value.to_string()),
            "detail" => self.detail = serde_json::from_str(value).ok().or(Some(serde_json::Value::String(value.to_string()))),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        match field.name() {
            "message" => self.message = rendered,
            "component" => self.component = Some(rendered),
            "detail" => self.detail = Some(serde_json::Value::String(rendered)),
            _ => {}
        }
    }
}

impl<S> Layer<S> for RingBufferLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = DetailVisitor {
            message: String::new(),
            component: None,
            detail: None,
        };
        event.record(&mut visitor);

        self.sink.record(LogRecord {
            timestamp: iso_now(),
            level: Level::from_tracing(event.metadata().level()),
            message: visitor.message,
            component: visitor.component,
            detail: visitor.detail,
        });
    }
}

/// Installs the process-wide `tracing` subscriber: an stderr fmt layer
/// plus the ring-buffer capture layer, floored by `LOG_LEVEL` (default
/// `info`). Call once at startup.
pub fn install_subscriber(sink: Arc<LoggerSink>) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let ring_layer = RingBufferLayer { sink };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ring_layer)
        .try_init();
}

/// Component-tagged logger handle (`createLogger({component})` in §4.4).
#[derive(Clone)]
pub struct Logger {
    component: &'static str,
    sink: Arc<LoggerSink>,
}

impl Logger {
    pub fn new(component: &'static str, sink: Arc<LoggerSink>) -> Self {
        Logger { component, sink }
    }

    pub fn debug(&self, message: String, detail: Option<serde_json::Value>) {
        self.emit(tracing::Level::DEBUG, message, detail);
    }

    pub fn info(&self, message: String, detail: Option<serde_json::Value>) {
        self.emit(tracing::Level::INFO, message, detail);
    }

    pub fn warn(&self, message: String, detail: Option<serde_json::Value>) {
        self.emit(tracing::Level::WARN, message, detail);
    }

    pub fn error(&self, message: String, detail: Option<serde_json::Value>) {
        self.emit(tracing::Level::ERROR, message, detail);
    }

    fn emit(&self, level: tracing::Level, message: String, detail: Option<serde_json::Value>) {
        let detail_str = detail.map(|d| d.to_string()).unwrap_or_default();
        match level {
            tracing::Level::DEBUG => {
                tracing::debug!(component = self.component, detail = %detail_str, "{message}")
            }
            tracing::Level::INFO => {
                tracing::info!(component = self.component, detail = %detail_str, "{message}")
            }
            tracing::Level::WARN => {
                tracing::warn!(component = self.component, detail = %detail_str, "{message}")
            }
            tracing::Level::ERROR => {
                tracing::error!(component = self.component, detail = %detail_str, "{message}")
            }
            _ => {}
        }
    }

    /// Returns the last `min(limit, 500)` records. `limit <= 0` returns
    /// empty (callers pass a `usize`, so this is enforced by validation at
    /// the dispatcher boundary instead).
    pub fn recent(&self, limit: usize) -> Vec<LogRecord> {
        self.sink.recent(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut ring = RingBuffer { records: VecDeque::new() };
        for i in 0..(RING_CAPACITY + 10) {
            ring.push(LogRecord {
                timestamp: "t".into(),
                level: Level::Info,
                message: format!("msg-{i}"),
                component: None,
                detail: None,
            });
        }
        assert_eq!(ring.records.len(), RING_CAPACITY);
        assert_eq!(ring.records.front().unwrap().message, "msg-10");
    }

    #[test]
    fn recent_limit_zero_is_empty() {
        let ring = RingBuffer { records: VecDeque::new() };
        assert!(ring.recent(0).is_empty());
    }

    #[test]
    fn recent_caps_at_capacity() {
        let mut ring = RingBuffer { records: VecDeque::new() };
        for i in 0..5 {
            ring.push(LogRecord {
                timestamp: "t".into(),
                level: Level::Info,
                message: format!("{i}"),
                component: None,
                detail: None,
            });
        }
        let recent = ring.recent(1000);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].message, "0");
        assert_eq!(recent[4].message, "4");
    }
}
