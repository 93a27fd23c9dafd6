//! The scan engine (§4.1, §5, §8) — a time-sliced, cancellable,
//! breadth-first directory walker.

pub mod node;

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};

pub use node::{classify_io_error, ErrorCode, Node, NodeKind, NodeMetadata};

use crate::logger::Logger;

pub type ScanId = String;

fn generate_scan_id() -> ScanId {
    let mut bytes = [0u8; 12]; // 96 bits
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("root path does not exist or is not reachable")]
    InvalidRoot,
    #[error("root path exists but is not a directory")]
    NotADirectory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOptions {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_time_slice_ms")]
    pub time_slice_ms: u64,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default)]
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub max_entries: Option<u64>,
    #[serde(default)]
    pub include_metadata: bool,
}

fn default_batch_size() -> usize {
    250
}
fn default_time_slice_ms() -> u64 {
    12
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            batch_size: default_batch_size(),
            time_slice_ms: default_time_slice_ms(),
            follow_symlinks: false,
            max_depth: None,
            max_entries: None,
            include_metadata: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Done,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum ScanEvent {
    #[serde(rename = "scan:registered")]
    Registered { scan_id: ScanId, options: ScanOptions },
    #[serde(rename = "scan:started")]
    Started { scan_id: ScanId, root_path: String },
    #[serde(rename = "scan:progress")]
    Progress {
        scan_id: ScanId,
        dirs_processed: u64,
        files_processed: u64,
        queue_length_remaining: usize,
        elapsed_ms: u64,
        approx_completion: Option<f64>,
    },
    #[serde(rename = "scan:partial")]
    Partial {
        scan_id: ScanId,
        nodes: Vec<Node>,
        #[serde(skip_serializing_if = "Option::is_none")]
        truncated: Option<bool>,
    },
    #[serde(rename = "scan:done")]
    Done {
        scan_id: ScanId,
        status: ScanStatus,
        cancelled: bool,
    },
}

/// Sink for a single scan's events. One observer per scan; the dispatcher
/// is responsible for detaching it when the initiating caller goes away.
pub trait ScanObserver: Send + Sync {
    fn emit(&self, event: ScanEvent);
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub scan_id: ScanId,
    pub root: String,
    pub options: ScanOptions,
    pub dirs_processed: u64,
    pub files_processed: u64,
    pub errors: u64,
    pub queue_length: usize,
    pub cancelled: bool,
    pub done: bool,
    pub truncated: bool,
    pub elapsed_ms: u64,
}

struct QueueItem {
    path: PathBuf,
    depth: u32,
}

struct ScanState {
    scan_id: ScanId,
    root: PathBuf,
    options: ScanOptions,
    started_instant: Instant,
    dirs_processed: u64,
    files_processed: u64,
    errors: u64,
    cancelled: bool,
    done: bool,
    truncated: bool,
    loop_started: bool,
    finalized: bool,
    emitted: HashSet<String>,
    pending: Vec<Node>,
    queue: VecDeque<QueueItem>,
}

impl ScanState {
    fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            scan_id: self.scan_id.clone(),
            root: self.root.to_string_lossy().into_owned(),
            options: self.options.clone(),
            dirs_processed: self.dirs_processed,
            files_processed: self.files_processed,
            errors: self.errors,
            queue_length: self.queue.len(),
            cancelled: self.cancelled,
            done: self.done,
            truncated: self.truncated,
            elapsed_ms: self.started_instant.elapsed().as_millis() as u64,
        }
    }
}

pub struct StartedScan {
    pub scan_id: ScanId,
    pub started_at: SystemTime,
    pub options: ScanOptions,
}

/// Registry of all scans the process has ever started. Mirrors the host's
/// `AppState`-held `parking_lot::Mutex`-guarded maps.
pub struct ScanEngine {
    states: Mutex<HashMap<ScanId, Arc<Mutex<ScanState>>>>,
    observers: Mutex<HashMap<ScanId, Arc<dyn ScanObserver>>>,
    logger: Logger,
}

impl ScanEngine {
    pub fn new(logger: Logger) -> Self {
        ScanEngine {
            states: Mutex::new(HashMap::new()),
            observers: Mutex::new(HashMap::new()),
            logger,
        }
    }

    pub fn start(
        self: &Arc<Self>,
        root: &Path,
        options: ScanOptions,
        observer: Arc<dyn ScanObserver>,
    ) -> Result<StartedScan, EngineError> {
        let canonical = root.canonicalize().map_err(|_| EngineError::InvalidRoot)?;
        let meta = std::fs::symlink_metadata(&canonical).map_err(|_| EngineError::InvalidRoot)?;
        if !meta.is_dir() {
            return Err(EngineError::NotADirectory);
        }

        let scan_id = generate_scan_id();
        let root_node = build_node_with_metadata(&canonical, 0, NodeKind::Dir, &meta, &options);

        let mut emitted = HashSet::new();
        emitted.insert(root_node.path.clone());

        let state = ScanState {
            scan_id: scan_id.clone(),
            root: canonical.clone(),
            options: options.clone(),
            started_instant: Instant::now(),
            dirs_processed: 0,
            files_processed: 0,
            errors: 0,
            cancelled: false,
            done: false,
            truncated: false,
            loop_started: false,
            finalized: false,
            emitted,
            pending: vec![root_node],
            queue: VecDeque::from([QueueItem {
                path: canonical.clone(),
                depth: 0,
            }]),
        };

        let state_arc = Arc::new(Mutex::new(state));
        self.states.lock().insert(scan_id.clone(), state_arc.clone());
        self.observers.lock().insert(scan_id.clone(), observer.clone());

        observer.emit(ScanEvent::Registered {
            scan_id: scan_id.clone(),
            options: options.clone(),
        });
        observer.emit(ScanEvent::Started {
            scan_id: scan_id.clone(),
            root_path: canonical.to_string_lossy().into_owned(),
        });

        self.logger.info(
            format!("scan {scan_id} registered for {}", canonical.display()),
            None,
        );

        let started_at = SystemTime::now();
        tauri::async_runtime::spawn(run_loop(state_arc, observer, self.logger.clone()));

        Ok(StartedScan {
            scan_id,
            started_at,
            options,
        })
    }

    pub fn cancel(&self, scan_id: &str) -> bool {
        let state_arc = match self.states.lock().get(scan_id).cloned() {
            Some(s) => s,
            None => return false,
        };
        let observer = self.observers.lock().get(scan_id).cloned();

        let should_finalize_now = {
            let mut st = state_arc.lock();
            if st.finalized {
                return true;
            }
            st.cancelled = true;
            !st.loop_started || st.queue.is_empty()
        };

        if should_finalize_now {
            if let Some(obs) = observer {
                finalize(&state_arc, obs.as_ref(), true);
            } else {
                let mut st = state_arc.lock();
                st.finalized = true;
                st.done = true;
            }
        }
        true
    }

    pub fn state_of(&self, scan_id: &str) -> Option<ScanSnapshot> {
        self.states
            .lock()
            .get(scan_id)
            .map(|s| s.lock().snapshot())
    }

    pub fn list_active(&self) -> Vec<ScanId> {
        self.states
            .lock()
            .iter()
            .filter(|(_, s)| !s.lock().done)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

fn emit_node(state: &Arc<Mutex<ScanState>>, observer: &dyn ScanObserver, node: Node) {
    let mut st = state.lock();
    if !st.emitted.insert(node.path.clone()) {
        return;
    }
    st.pending.push(node);
    if st.pending.len() >= st.options.batch_size {
        flush_pending(&mut st, observer);
    }
}

fn flush_pending(st: &mut ScanState, observer: &dyn ScanObserver) {
    if st.pending.is_empty() {
        return;
    }
    let nodes = std::mem::take(&mut st.pending);
    observer.emit(ScanEvent::Partial {
        scan_id: st.scan_id.clone(),
        nodes,
        truncated: if st.truncated { Some(true) } else { None },
    });
}

fn emit_progress(st: &ScanState, observer: &dyn ScanObserver) {
    let approx_completion = st
        .options
        .max_entries
        .map(|max| ((st.dirs_processed + st.files_processed) as f64 / max as f64).min(1.0));
    observer.emit(ScanEvent::Progress {
        scan_id: st.scan_id.clone(),
        dirs_processed: st.dirs_processed,
        files_processed: st.files_processed,
        queue_length_remaining: st.queue.len(),
        elapsed_ms: st.started_instant.elapsed().as_millis() as u64,
        approx_completion,
    });
}

fn build_node_with_metadata(path: &Path, depth: u32, kind: NodeKind, meta: &std::fs::Metadata, options: &ScanOptions) -> Node {
    if options.include_metadata {
        Node::with_metadata(path, depth, kind, NodeMetadata::build(path, meta))
    } else {
        Node::plain(path, depth, kind)
    }
}

fn cap_reached(st: &ScanState) -> bool {
    st.options
        .max_entries
        .map(|max| st.dirs_processed + st.files_processed >= max)
        .unwrap_or(false)
}

/// Processes exactly one directory dequeued from the front of the queue:
/// stats it, reads its children, enqueues sub-directories, emits nodes.
/// Synchronous by design — a slice runs to completion without yielding.
fn process_one(state: &Arc<Mutex<ScanState>>, observer: &dyn ScanObserver) {
    let item = {
        let mut st = state.lock();
        st.queue.pop_front()
    };
    let Some(QueueItem { path, depth }) = item else {
        return;
    };

    let meta = match std::fs::symlink_metadata(&path) {
        Ok(m) => m,
        Err(e) => {
            let code = classify_io_error(&e);
            emit_node(state, observer, Node::error_node(&path, depth, NodeKind::Dir, e.to_string(), code));
            let mut st = state.lock();
            st.errors += 1;
            if !st.truncated {
                st.dirs_processed += 1;
            }
            emit_progress(&st, observer);
            return;
        }
    };

    if !meta.is_dir() {
        // Raced change: the queued path stopped being a directory.
        emit_node(
            state,
            observer,
            Node::error_node(&path, depth, NodeKind::File, "path is no longer a directory".into(), ErrorCode::Enotdir),
        );
        let mut st = state.lock();
        st.errors += 1;
        if !st.truncated {
            st.files_processed += 1;
        }
        return;
    }

    let options = { state.lock().options.clone() };

    if let Some(max_depth) = options.max_depth {
        if depth > max_depth {
            emit_node(state, observer, Node::depth_limited(&path, depth));
            let mut st = state.lock();
            if !st.truncated {
                st.dirs_processed += 1;
            }
            emit_progress(&st, observer);
            return;
        }
    }

    let entries = match std::fs::read_dir(&path) {
        Ok(e) => e,
        Err(e) => {
            let code = classify_io_error(&e);
            emit_node(state, observer, Node::error_node(&path, depth, NodeKind::Dir, e.to_string(), code));
            let mut st = state.lock();
            st.errors += 1;
            if !st.truncated {
                st.dirs_processed += 1;
            }
            emit_progress(&st, observer);
            return;
        }
    };

    // The directory node itself was already emitted either as the root or
    // as a child in a previous iteration; emit_node's dedup makes this a
    // no-op in that case.
    emit_node(state, observer, build_node_with_metadata(&path, depth, NodeKind::Dir, &meta, &options));

    for entry in entries {
        {
            let mut st = state.lock();
            if st.cancelled {
                break;
            }
            if cap_reached(&st) {
                st.truncated = true;
                break;
            }
        }
        let Ok(entry) = entry else { continue };
        let child_path = entry.path();

        let child_meta = match std::fs::symlink_metadata(&child_path) {
            Ok(m) => m,
            Err(e) => {
                let code = classify_io_error(&e);
                emit_node(state, observer, Node::error_node(&child_path, depth + 1, NodeKind::File, e.to_string(), code));
                let mut st = state.lock();
                st.errors += 1;
                if !st.truncated {
                    st.files_processed += 1;
                }
                continue;
            }
        };

        let is_symlink = child_meta.file_type().is_symlink();
        let treat_as_dir = child_meta.is_dir() && !(is_symlink && !options.follow_symlinks);

        if treat_as_dir {
            let next_depth = depth + 1;
            if let Some(max_depth) = options.max_depth {
                if next_depth > max_depth {
                    emit_node(state, observer, Node::depth_limited(&child_path, next_depth));
                    let mut st = state.lock();
                    if !st.truncated {
                        st.dirs_processed += 1;
                    }
                    continue;
                }
            }
            emit_node(state, observer, build_node_with_metadata(&child_path, next_depth, NodeKind::Dir, &child_meta, &options));
            let mut st = state.lock();
            if !st.cancelled {
                st.queue.push_back(QueueItem { path: child_path, depth: next_depth });
            }
        } else {
            emit_node(state, observer, build_node_with_metadata(&child_path, depth + 1, NodeKind::File, &child_meta, &options));
            let mut st = state.lock();
            if !st.truncated {
                st.files_processed += 1;
            }
        }
    }

    let mut st = state.lock();
    if !st.truncated {
        st.dirs_processed += 1;
    }
    emit_progress(&st, observer);
}

fn finalize(state: &Arc<Mutex<ScanState>>, observer: &dyn ScanObserver, cancelled_requested: bool) {
    let leftover = {
        let mut st = state.lock();
        if st.finalized {
            return;
        }
        st.finalized = true;
        st.done = true;
        if cancelled_requested {
            st.cancelled = true;
        }
        if st.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut st.pending))
        }
    };

    if let Some(nodes) = leftover {
        let (scan_id, truncated) = {
            let st = state.lock();
            (st.scan_id.clone(), st.truncated)
        };
        observer.emit(ScanEvent::Partial {
            scan_id,
            nodes,
            truncated: if truncated { Some(true) } else { None },
        });
    }

    let (scan_id, cancelled) = {
        let st = state.lock();
        (st.scan_id.clone(), st.cancelled)
    };
    let status = if cancelled { ScanStatus::Cancelled } else { ScanStatus::Done };
    observer.emit(ScanEvent::Done { scan_id, status, cancelled });
}

async fn run_loop(state: Arc<Mutex<ScanState>>, observer: Arc<dyn ScanObserver>, logger: Logger) {
    {
        let mut st = state.lock();
        if st.done {
            return;
        }
        st.loop_started = true;
    }

    loop {
        {
            let st = state.lock();
            if st.cancelled {
                drop(st);
                finalize(&state, observer.as_ref(), true);
                return;
            }
        }

        let slice_start = Instant::now();
        let time_slice = { state.lock().options.time_slice_ms };

        loop {
            let should_stop = {
                let mut st = state.lock();
                if st.queue.is_empty() || st.cancelled {
                    true
                } else if Duration::from_millis(time_slice) <= slice_start.elapsed() {
                    true
                } else if cap_reached(&st) {
                    st.truncated = true;
                    true
                } else {
                    false
                }
            };
            if should_stop {
                break;
            }
            process_one(&state, observer.as_ref());
        }

        let should_flush = {
            let st = state.lock();
            !st.pending.is_empty() && (st.cancelled || st.queue.is_empty() || st.truncated)
        };
        if should_flush {
            let mut st = state.lock();
            flush_pending(&mut st, observer.as_ref());
        }

        let terminal = {
            let st = state.lock();
            st.cancelled || st.queue.is_empty() || st.truncated
        };

        if terminal {
            let cancelled = { state.lock().cancelled };
            finalize(&state, observer.as_ref(), cancelled);
            logger.debug("scan loop finished".to_string(), None);
            return;
        }

        tokio::task::yield_now().await;
    }
}
