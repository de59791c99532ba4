//! Tree nodes and their serialized listing view.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

/// Hours added to UTC when formatting timestamps for client display.
const DISPLAY_OFFSET_HOURS: i64 = 8;
/// Fixed display format for `modtime` fields.
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One node of the virtual tree: a file, an explicit directory (backed by
/// a marker object) or a directory synthesized from a common key prefix.
///
/// Entries are shared as `Arc<Entry>` snapshots; once handed out in a
/// response they may be superseded by a later refresh, so holders must not
/// assume the entry is still in the tree.
#[derive(Debug)]
pub struct Entry {
    /// Base name of the node, derived from its path.
    pub name: String,
    pub is_dir: bool,
    /// Marker-backed directories and the root carry this flag; directories
    /// synthesized from common prefixes do not.
    pub hidden: bool,
    /// Byte size; 0 for directories.
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Virtual path this entry points at, when it is a symlink.
    pub symlink: Option<String>,
    /// Content accumulated by in-flight writes. Guarded independently of
    /// the tree lock so an upload does not block unrelated refreshes.
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Entry {
    /// A regular file node.
    pub fn file(name: impl Into<String>, size: u64, modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            hidden: false,
            size,
            modified,
            symlink: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A directory node; `hidden` marks marker-backed directories.
    pub fn directory(name: impl Into<String>, hidden: bool, modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            hidden,
            size: 0,
            modified,
            symlink: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A link node pointing at another virtual path.
    pub fn symlink(name: impl Into<String>, target: impl Into<String>, modified: DateTime<Utc>) -> Self {
        Self {
            symlink: Some(target.into()),
            ..Self::file(name, 0, modified)
        }
    }

    /// The sentinel for `/`, held outside the tree mapping.
    pub fn root() -> Self {
        Self::directory("/", true, Utc::now())
    }

    /// Shared handle to the content buffer (the per-entry content lock).
    pub fn buffer(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.buffer)
    }

    /// Rebind this entry under a new base name, sharing the same content
    /// buffer so an in-flight write follows the rename.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: self.is_dir,
            hidden: self.hidden,
            size: self.size,
            modified: self.modified,
            symlink: self.symlink.clone(),
            buffer: Arc::clone(&self.buffer),
        }
    }

    /// Modification time in the fixed client display format.
    pub fn display_time(&self) -> String {
        (self.modified + Duration::hours(DISPLAY_OFFSET_HOURS))
            .format(DISPLAY_FORMAT)
            .to_string()
    }
}

/// Serialized listing record for the administrative surface.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub modtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symlink: Option<String>,
    pub isdir: bool,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub hide: bool,
}

impl FileInfo {
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            name: entry.name.clone(),
            modtime: entry.display_time(),
            symlink: entry.symlink.clone(),
            isdir: entry.is_dir,
            size: entry.size,
            url: None,
            hide: entry.hidden,
        }
    }
}
