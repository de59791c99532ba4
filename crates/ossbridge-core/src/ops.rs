//! Filesystem-style operations over the virtual tree.
//!
//! [`FsHandler`] is the single entry point both protocol frontends share.
//! Listing-class operations refresh the tree from the backend before
//! resolving; transfer-class operations (read, write) resolve against the
//! cache as-is. Every refresh-then-mutate sequence runs under the tree
//! lock, so concurrent requests see either the old tree or the new one,
//! never a mix.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::entry::{Entry, FileInfo};
use crate::error::{FsError, FsResult};
use crate::path;
use crate::store::ObjectStore;
use crate::tree::FileTree;

/// Operation handler bridging protocol requests to the object store.
pub struct FsHandler {
    store: Arc<dyn ObjectStore>,
    tree: FileTree,
}

impl FsHandler {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            tree: FileTree::new(Arc::clone(&store)),
            store,
        }
    }

    /// The underlying tree, for seeding state in tests.
    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    /// Open a file for reading. The whole object body is fetched up front;
    /// subsequent reads are served from the snapshot.
    ///
    /// A symlink is followed exactly one hop. The target must itself be a
    /// plain file already present in the tree; a missing target or a
    /// second link both resolve to NotFound.
    pub async fn open_read(&self, raw_path: &str) -> FsResult<ObjectReader> {
        let vpath = path::normalize(raw_path);
        let state = self.tree.lock().await;

        let entry = state
            .lookup(&vpath)
            .ok_or_else(|| FsError::not_found(&vpath))?;
        let (target_path, target) = match &entry.symlink {
            Some(link) => {
                let resolved = path::normalize(link);
                let target = state
                    .lookup(&resolved)
                    .filter(|t| t.symlink.is_none())
                    .ok_or_else(|| FsError::not_found(&resolved))?;
                (resolved, target)
            }
            None => (vpath, entry),
        };
        if target.is_dir {
            return Err(FsError::invalid_operation(&target_path));
        }
        drop(state);

        let key = path::to_key(&target_path, false);
        let data = self.store.get(&key).await?;
        debug!(path = %target_path, bytes = data.len(), "opened for read");
        Ok(ObjectReader { data })
    }

    /// Open a file for writing. An existing entry is reused; otherwise the
    /// parent must already resolve to a directory and a fresh entry is
    /// created. The entry is registered in the open-writes table so a
    /// concurrent refresh cannot drop it while the handle is live.
    pub async fn open_write(&self, raw_path: &str) -> FsResult<FileWriter> {
        let vpath = path::normalize(raw_path);
        let mut state = self.tree.lock().await;

        let entry = match state.lookup(&vpath) {
            Some(existing) if existing.is_dir => {
                return Err(FsError::invalid_operation(&vpath));
            }
            Some(existing) => existing,
            None => {
                let parent_path = path::parent(&vpath);
                let parent = state
                    .lookup(&parent_path)
                    .ok_or_else(|| FsError::not_found(&parent_path))?;
                if !parent.is_dir {
                    return Err(FsError::invalid_operation(parent_path));
                }
                let entry = Arc::new(Entry::file(path::file_name(&vpath), 0, Utc::now()));
                state.insert(vpath.clone(), Arc::clone(&entry));
                entry
            }
        };
        state.begin_write(vpath.clone(), Arc::clone(&entry));
        debug!(path = %vpath, "opened for write");

        Ok(FileWriter {
            key: path::to_key(&vpath, false),
            path: vpath,
            buffer: entry.buffer(),
            store: Arc::clone(&self.store),
        })
    }

    /// Release the open-writes registration for a closed write handle.
    pub async fn close_write(&self, raw_path: &str) {
        let vpath = path::normalize(raw_path);
        self.tree.lock().await.end_write(&vpath);
    }

    /// List the children of a directory, refreshing the tree at that path
    /// first so the listing reflects the backend. A path with nothing
    /// under it yields an empty listing.
    pub async fn list(&self, raw_path: &str) -> FsResult<Vec<Arc<Entry>>> {
        let vpath = path::normalize(raw_path);
        let mut state = self.tree.lock().await;

        let fresh = self.tree.fetch(&vpath, false).await?;
        state.replace(fresh);
        Ok(state.children_of(&vpath))
    }

    /// Stat a path, refreshing its parent directory first.
    pub async fn stat(&self, raw_path: &str) -> FsResult<Arc<Entry>> {
        let vpath = path::normalize(raw_path);
        let mut state = self.tree.lock().await;

        let fresh = self.tree.fetch(&path::parent(&vpath), false).await?;
        state.replace(fresh);

        state
            .lookup(&vpath)
            .ok_or_else(|| FsError::not_found(&vpath))
    }

    /// Resolve a symlink's target path, refreshing the parent directory
    /// first. The single hop is verified the same way a read resolves it:
    /// the target must be present and not itself a link, so a dangling or
    /// chained link is NotFound.
    pub async fn readlink(&self, raw_path: &str) -> FsResult<String> {
        let vpath = path::normalize(raw_path);
        let mut state = self.tree.lock().await;

        let fresh = self.tree.fetch(&path::parent(&vpath), false).await?;
        state.replace(fresh);

        let entry = state
            .lookup(&vpath)
            .ok_or_else(|| FsError::not_found(&vpath))?;
        let link = entry
            .symlink
            .clone()
            .ok_or_else(|| FsError::invalid_operation(&vpath))?;
        let target = path::normalize(&link);
        state
            .lookup(&target)
            .filter(|t| t.symlink.is_none())
            .ok_or_else(|| FsError::not_found(&target))?;
        Ok(target)
    }

    /// Rename via copy-then-delete. Not atomic: a copy failure leaves the
    /// source untouched, a delete failure leaves both names present.
    ///
    /// Renaming a directory moves only its marker object; keys under the
    /// old prefix keep their names.
    pub async fn rename(&self, raw_src: &str, raw_dest: &str) -> FsResult<()> {
        let src = path::normalize(raw_src);
        let dest = path::normalize(raw_dest);
        let mut state = self.tree.lock().await;

        let fresh = self.tree.fetch(&path::parent(&src), false).await?;
        state.replace(fresh);

        let entry = state.lookup(&src).ok_or_else(|| FsError::not_found(&src))?;
        if state.lookup(&dest).is_some() {
            return Err(FsError::already_exists(&dest));
        }

        let src_key = path::to_key(&src, entry.is_dir);
        let dest_key = path::to_key(&dest, entry.is_dir);
        self.store.copy(&dest_key, &src_key).await?;
        self.store.delete(&src_key).await?;

        state.remove(&src);
        let renamed = Arc::new(entry.renamed(path::file_name(&dest)));
        state.insert(dest.clone(), renamed);
        debug!(%src, %dest, "renamed");
        Ok(())
    }

    /// Remove a file or a directory marker. Only the exact key is deleted;
    /// removing a directory leaves keys under its prefix in place.
    pub async fn remove(&self, raw_path: &str) -> FsResult<()> {
        let vpath = path::normalize(raw_path);
        let mut state = self.tree.lock().await;

        let fresh = self.tree.fetch(&path::parent(&vpath), false).await?;
        state.replace(fresh);

        let entry = state
            .lookup(&vpath)
            .ok_or_else(|| FsError::not_found(&vpath))?;
        let key = path::to_key(&vpath, entry.is_dir);
        self.store.delete(&key).await?;
        state.remove(&vpath);
        debug!(path = %vpath, "removed");
        Ok(())
    }

    /// Create a directory by writing its marker object.
    pub async fn mkdir(&self, raw_path: &str) -> FsResult<()> {
        let vpath = path::normalize(raw_path);
        let mut state = self.tree.lock().await;

        let fresh = self.tree.fetch(&path::parent(&vpath), false).await?;
        state.replace(fresh);

        if state.lookup(&vpath).is_some() {
            return Err(FsError::already_exists(&vpath));
        }
        let parent_path = path::parent(&vpath);
        let parent = state
            .lookup(&parent_path)
            .ok_or_else(|| FsError::not_found(&parent_path))?;
        if !parent.is_dir {
            return Err(FsError::invalid_operation(parent_path));
        }

        let key = path::to_key(&vpath, true);
        self.store.put(&key, b"").await?;
        state.insert(
            vpath.clone(),
            Arc::new(Entry::directory(path::file_name(&vpath), false, Utc::now())),
        );
        debug!(path = %vpath, "created directory");
        Ok(())
    }

    /// Attribute updates are accepted and discarded; the backend keeps no
    /// mode, owner or times to set. The path must still exist.
    pub async fn setstat(&self, raw_path: &str) -> FsResult<()> {
        self.stat(raw_path).await.map(|_| ())
    }

    /// Link creation has no backend representation.
    pub async fn symlink(&self, _target: &str, _link: &str) -> FsResult<()> {
        Err(FsError::Protocol("symlink is not supported"))
    }

    /// Administrative listing: every entry of the refreshed listing keyed
    /// by virtual path, including the prefix's own marker (its `hide`
    /// flag tells consumers to skip it). With a share expiry each file
    /// gets a signed URL and directories get a `-` placeholder.
    pub async fn list_files(
        &self,
        raw_path: &str,
        recursive: bool,
        share_expiry: Option<Duration>,
    ) -> FsResult<BTreeMap<String, FileInfo>> {
        let vpath = path::normalize(raw_path);
        let mut state = self.tree.lock().await;

        let fresh = self.tree.fetch(&vpath, recursive).await?;
        let mut records = BTreeMap::new();
        for (child_path, entry) in &fresh {
            let mut info = FileInfo::from_entry(entry);
            if let Some(expiry) = share_expiry {
                info.url = if entry.is_dir {
                    Some("-".to_string())
                } else {
                    Some(
                        self.store
                            .signed_url(&path::to_key(child_path, false), expiry)
                            .await?,
                    )
                };
            }
            records.insert(child_path.clone(), info);
        }
        state.replace(fresh);
        Ok(records)
    }

    /// Administrative delete: every key the refreshed listing yields under
    /// the prefix, file objects first so a failure partway cannot orphan
    /// content under an already-deleted marker. Returns the number of
    /// keys deleted.
    pub async fn delete_files(&self, raw_path: &str, recursive: bool) -> FsResult<usize> {
        let vpath = path::normalize(raw_path);
        let mut state = self.tree.lock().await;

        let fresh = self.tree.fetch(&vpath, recursive).await?;
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for (child_path, entry) in &fresh {
            if entry.is_dir {
                dirs.push(path::to_key(child_path, true));
            } else {
                files.push(path::to_key(child_path, false));
            }
        }

        let deleted = files.len() + dirs.len();
        if !files.is_empty() {
            self.store.delete_many(&files).await?;
        }
        if !dirs.is_empty() {
            self.store.delete_many(&dirs).await?;
        }
        for child_path in fresh.keys() {
            state.remove(child_path);
        }
        debug!(path = %vpath, deleted, "batch delete");
        Ok(deleted)
    }

    /// Administrative copy: server-side copy of each (source, destination)
    /// file pair, continuing past failures and reporting both sides.
    pub async fn copy_objects(&self, pairs: &[(String, String)]) -> CopyReport {
        let mut report = CopyReport::default();
        for (raw_src, raw_dest) in pairs {
            let src_key = path::to_key(&path::normalize(raw_src), false);
            let dest_key = path::to_key(&path::normalize(raw_dest), false);
            match self.store.copy(&dest_key, &src_key).await {
                Ok(()) => report.successes.push(CopyOutcome {
                    path: raw_src.clone(),
                    msg: None,
                }),
                Err(err) => {
                    warn!(src = %src_key, dest = %dest_key, error = %err, "copy failed");
                    report.errors.push(CopyOutcome {
                        path: raw_src.clone(),
                        msg: Some(err.to_string()),
                    });
                }
            }
        }
        report
    }

    /// Pre-signed download URL for a single file.
    pub async fn signed_url(&self, raw_path: &str, expiry: Duration) -> FsResult<String> {
        let entry = self.stat(raw_path).await?;
        let vpath = path::normalize(raw_path);
        if entry.is_dir {
            return Err(FsError::invalid_operation(&vpath));
        }
        let key = path::to_key(&vpath, false);
        Ok(self.store.signed_url(&key, expiry).await?)
    }
}

/// Immutable snapshot of an object body, served in ranged slices.
pub struct ObjectReader {
    data: Vec<u8>,
}

impl ObjectReader {
    /// Slice `len` bytes at `offset`, clamped to the snapshot. An empty
    /// slice at or past the end signals end-of-file.
    pub fn read_at(&self, offset: u64, len: u32) -> &[u8] {
        let start = (offset as usize).min(self.data.len());
        let end = start.saturating_add(len as usize).min(self.data.len());
        &self.data[start..end]
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("len", &self.data.len())
            .finish()
    }
}

/// Largest object a write handle will buffer.
pub const MAX_WRITE_BYTES: u64 = 1 << 30;

/// An open write handle. Every chunk grows the shared buffer as needed and
/// re-uploads the whole object, so the stored object always matches the
/// buffer (last write wins under concurrency).
pub struct FileWriter {
    path: String,
    key: String,
    buffer: Arc<Mutex<Vec<u8>>>,
    store: Arc<dyn ObjectStore>,
}

impl FileWriter {
    /// Normalized virtual path this handle writes to.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Apply a chunk at `offset` and upload the full buffer. Offsets are
    /// client-controlled, so anything past [`MAX_WRITE_BYTES`] is rejected
    /// before it can grow the buffer.
    pub async fn write_at(&self, offset: u64, data: &[u8]) -> FsResult<u32> {
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= MAX_WRITE_BYTES)
            .ok_or_else(|| FsError::invalid_operation(&self.path))? as usize;
        let mut buffer = self.buffer.lock().await;
        if buffer.len() < end {
            buffer.resize(end, 0);
        }
        buffer[offset as usize..end].copy_from_slice(data);
        self.store.put(&self.key, &buffer).await?;
        Ok(data.len() as u32)
    }

    /// Bytes accumulated so far.
    pub async fn len(&self) -> u64 {
        self.buffer.lock().await.len() as u64
    }
}

impl fmt::Debug for FileWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileWriter")
            .field("path", &self.path)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Outcome of an administrative batch copy.
#[derive(Debug, Default, Serialize)]
pub struct CopyReport {
    pub successes: Vec<CopyOutcome>,
    pub errors: Vec<CopyOutcome>,
}

/// One copied (or failed) source path.
#[derive(Debug, Serialize)]
pub struct CopyOutcome {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}
