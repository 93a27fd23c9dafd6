//! The [`Node`] record and its supporting enums (§3 "Node").

use serde::Serialize;
use std::fs::Metadata;
use std::path::Path;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Dir,
    File,
}

/// Normalised error tag attached to a node's error-bearing field (§4.1
/// "Error classifier").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "EACCES")]
    Eacces,
    #[serde(rename = "ENOENT")]
    Enoent,
    #[serde(rename = "ENOTDIR")]
    Enotdir,
    #[serde(rename = "EEXIST")]
    Eexist,
    #[serde(rename = "EINVAL")]
    Einval,
    #[serde(rename = "ENOSPC")]
    Enospc,
    #[serde(rename = "EMFILE")]
    Emfile,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::Eacces => "EACCES",
            ErrorCode::Enoent => "ENOENT",
            ErrorCode::Enotdir => "ENOTDIR",
            ErrorCode::Eexist => "EEXIST",
            ErrorCode::Einval => "EINVAL",
            ErrorCode::Enospc => "ENOSPC",
            ErrorCode::Emfile => "EMFILE",
            ErrorCode::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Maps a platform I/O error to the normalised code set. Falls back to
/// `UNKNOWN` for anything not recognised.
pub fn classify_io_error(err: &std::io::Error) -> ErrorCode {
    use std::io::ErrorKind::*;
    match err.kind() {
        NotFound => return ErrorCode::Enoent,
        PermissionDenied => return ErrorCode::Eacces,
        AlreadyExists => return ErrorCode::Eexist,
        InvalidInput | InvalidData => return ErrorCode::Einval,
        _ => {}
    }
    #[cfg(unix)]
    if let Some(errno) = err.raw_os_error() {
        // Common to Linux and macOS; not sourced from libc to avoid an
        // extra dependency for eight constants.
        match errno {
            13 => return ErrorCode::Eacces,
            2 => return ErrorCode::Enoent,
            20 => return ErrorCode::Enotdir,
            17 => return ErrorCode::Eexist,
            22 => return ErrorCode::Einval,
            28 => return ErrorCode::Enospc,
            24 => return ErrorCode::Emfile,
            _ => {}
        }
    }
    ErrorCode::Unknown
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    pub size: u64,
    pub atime: Option<i64>,
    pub mtime: Option<i64>,
    pub ctime: Option<i64>,
    pub birthtime: Option<i64>,
    pub symlink_target: Option<String>,
    pub resolved_type: Option<NodeKind>,
}

fn to_epoch_ms(t: SystemTime) -> Option<i64> {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis() as i64)
}

impl NodeMetadata {
    /// Builds the metadata bundle for `path`. `meta` is the non-following
    /// stat already taken by the caller; if it names a symlink, the target
    /// and resolved type are attached on a best-effort basis.
    pub fn build(path: &Path, meta: &Metadata) -> Self {
        let ctime = platform_ctime(meta);
        let (symlink_target, resolved_type) = if meta.file_type().is_symlink() {
            let target = std::fs::read_link(path)
                .ok()
                .map(|p| p.to_string_lossy().into_owned());
            let resolved = std::fs::metadata(path).ok().map(|m| {
                if m.is_dir() {
                    NodeKind::Dir
                } else {
                    NodeKind::File
                }
            });
            (target, resolved)
        } else {
            (None, None)
        };

        NodeMetadata {
            size: meta.len(),
            atime: meta.accessed().ok().and_then(to_epoch_ms),
            mtime: meta.modified().ok().and_then(to_epoch_ms),
            ctime,
            birthtime: meta.created().ok().and_then(to_epoch_ms),
            symlink_target,
            resolved_type,
        }
    }
}

#[cfg(unix)]
fn platform_ctime(meta: &Metadata) -> Option<i64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ctime() * 1000 + meta.ctime_nsec() / 1_000_000)
}

#[cfg(not(unix))]
fn platform_ctime(_meta: &Metadata) -> Option<i64> {
    None
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub path: String,
    pub name: String,
    pub depth: u32,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_limited: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<NodeMetadata>,
}

impl Node {
    fn name_of(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned())
    }

    pub fn plain(path: &Path, depth: u32, kind: NodeKind) -> Self {
        Node {
            path: path.to_string_lossy().into_owned(),
            name: Self::name_of(path),
            depth,
            kind,
            error: None,
            error_code: None,
            depth_limited: None,
            metadata: None,
        }
    }

    pub fn with_metadata(path: &Path, depth: u32, kind: NodeKind, metadata: NodeMetadata) -> Self {
        let mut node = Self::plain(path, depth, kind);
        node.metadata = Some(metadata);
        node
    }

    pub fn error_node(path: &Path, depth: u32, kind: NodeKind, message: String, code: ErrorCode) -> Self {
        let mut node = Self::plain(path, depth, kind);
        node.error = Some(message);
        node.error_code = Some(code);
        node
    }

    pub fn depth_limited(path: &Path, depth: u32) -> Self {
        let mut node = Self::plain(path, depth, NodeKind::Dir);
        node.depth_limited = Some(true);
        node
    }
}
