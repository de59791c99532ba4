//! Refresh-on-read cache of the virtual tree.
//!
//! The mapping is rebuilt wholesale from a backend listing on every
//! listing-class request and never invalidated in place; consistency is
//! scoped to the request that triggered the refresh.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};

use crate::entry::Entry;
use crate::error::StoreError;
use crate::path;
use crate::store::{LIST_PAGE_SIZE, ObjectStore};

/// Virtual path → entry cache over an injected object store.
pub struct FileTree {
    store: Arc<dyn ObjectStore>,
    state: Mutex<TreeState>,
}

/// Tree contents, guarded by the single tree lock. Operations hold the
/// lock across their whole refresh-then-mutate sequence so no request
/// observes a half-updated tree.
pub struct TreeState {
    /// Sentinel for `/`; always a directory, never in the map.
    root: Arc<Entry>,
    entries: HashMap<String, Arc<Entry>>,
    /// Entries with writes in flight; they survive wholesale replacement
    /// so a concurrent refresh cannot drop a node a writer still holds.
    open_writes: HashMap<String, Arc<Entry>>,
}

impl FileTree {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            state: Mutex::new(TreeState {
                root: Arc::new(Entry::root()),
                entries: HashMap::new(),
                open_writes: HashMap::new(),
            }),
        }
    }

    /// Acquire the tree lock.
    pub async fn lock(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock().await
    }

    /// Build a fresh path → entry mapping for keys under `prefix`.
    ///
    /// Non-recursive listing passes the hierarchy delimiter so the store
    /// groups deeper keys; each common prefix becomes a synthesized,
    /// non-hidden directory entry (size 0, mtime now, since the backend
    /// reports no metadata for them). Recursive listing passes no
    /// delimiter and
    /// every key becomes a leaf entry. Only the first page of
    /// [`LIST_PAGE_SIZE`] keys is fetched.
    ///
    /// This does not touch the cached state; pair it with
    /// [`TreeState::replace`] under the tree lock.
    pub async fn fetch(
        &self,
        prefix: &str,
        recursive: bool,
    ) -> Result<HashMap<String, Arc<Entry>>, StoreError> {
        let key_prefix = path::to_key(&path::normalize(prefix), true);
        let delimiter = if recursive { "" } else { "/" };

        let listing = self
            .store
            .list(&key_prefix, delimiter, "", LIST_PAGE_SIZE)
            .await?;

        let mut entries = HashMap::new();
        for object in listing.objects {
            let vpath = path::to_path(&object.key);
            let modified = object.last_modified.unwrap_or_else(Utc::now);
            let entry = if object.key.ends_with('/') {
                Entry::directory(path::file_name(&vpath), true, modified)
            } else {
                Entry::file(path::file_name(&vpath), object.size, modified)
            };
            entries.insert(vpath, Arc::new(entry));
        }
        for prefix_key in listing.common_prefixes {
            let vpath = path::to_path(&prefix_key);
            let entry = Entry::directory(path::file_name(&vpath), false, Utc::now());
            entries.insert(vpath, Arc::new(entry));
        }
        Ok(entries)
    }
}

impl TreeState {
    /// Resolve a path against the current mapping. The root sentinel
    /// always exists; anything else must have been loaded by a prior
    /// refresh. Lookup never refreshes.
    pub fn lookup(&self, path: &str) -> Option<Arc<Entry>> {
        if path == "/" {
            return Some(Arc::clone(&self.root));
        }
        self.entries.get(path).cloned()
    }

    /// Swap the whole mapping, then lay the open-writes side table back
    /// over it so in-flight entries stay current.
    pub fn replace(&mut self, mut entries: HashMap<String, Arc<Entry>>) {
        for (path, entry) in &self.open_writes {
            entries.insert(path.clone(), Arc::clone(entry));
        }
        self.entries = entries;
    }

    pub fn insert(&mut self, path: impl Into<String>, entry: Arc<Entry>) {
        self.entries.insert(path.into(), entry);
    }

    pub fn remove(&mut self, path: &str) -> Option<Arc<Entry>> {
        self.entries.remove(path)
    }

    /// Register an entry as write-in-progress.
    pub fn begin_write(&mut self, path: impl Into<String>, entry: Arc<Entry>) {
        self.open_writes.insert(path.into(), entry);
    }

    /// Drop a write-in-progress registration once its handle closes.
    pub fn end_write(&mut self, path: &str) {
        self.open_writes.remove(path);
    }

    /// Entries whose parent is exactly `path`, sorted by path for
    /// deterministic listings.
    pub fn children_of(&self, path: &str) -> Vec<Arc<Entry>> {
        let mut paths: Vec<&String> = self
            .entries
            .keys()
            .filter(|candidate| path::parent(candidate) == path)
            .collect();
        paths.sort();
        paths
            .into_iter()
            .map(|p| Arc::clone(&self.entries[p]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    async fn seeded_tree() -> FileTree {
        let store = Arc::new(MemoryStore::new());
        store.insert("a/", b"".to_vec()).await;
        store.insert("a/b.txt", b"0123456789".to_vec()).await;
        store.insert("a/c/", b"".to_vec()).await;
        store.insert("a/c/d.txt", b"x".to_vec()).await;
        FileTree::new(store)
    }

    #[tokio::test]
    async fn non_recursive_fetch_synthesizes_common_prefix_dirs() {
        let tree = seeded_tree().await;
        let entries = tree.fetch("/a", false).await.unwrap();

        let b = &entries["/a/b.txt"];
        assert!(!b.is_dir);
        assert_eq!(b.size, 10);

        // marker for the listed prefix itself, hidden
        assert!(entries["/a"].is_dir);
        assert!(entries["/a"].hidden);

        // synthesized from the common prefix, not hidden
        let c = &entries["/a/c"];
        assert!(c.is_dir);
        assert!(!c.hidden);
        assert_eq!(c.size, 0);

        // nothing deeper than the immediate children
        assert!(!entries.contains_key("/a/c/d.txt"));
    }

    #[tokio::test]
    async fn recursive_fetch_returns_every_key_as_leaf() {
        let tree = seeded_tree().await;
        let entries = tree.fetch("/a", true).await.unwrap();
        assert!(entries.contains_key("/a/c/d.txt"));
        assert!(entries["/a/c"].is_dir);
        assert!(entries["/a/c"].hidden);
    }

    #[tokio::test]
    async fn lookup_returns_root_sentinel_without_refresh() {
        let tree = FileTree::new(Arc::new(MemoryStore::new()));
        let state = tree.lock().await;
        let root = state.lookup("/").unwrap();
        assert!(root.is_dir);
        assert!(state.lookup("/missing").is_none());
    }

    #[tokio::test]
    async fn replace_keeps_write_in_progress_entries() {
        let tree = seeded_tree().await;
        let mut state = tree.lock().await;
        let entry = Arc::new(Entry::file("w.txt", 0, Utc::now()));
        state.insert("/a/w.txt", Arc::clone(&entry));
        state.begin_write("/a/w.txt", Arc::clone(&entry));

        let fresh = tree.fetch("/a", false).await.unwrap();
        state.replace(fresh);
        assert!(Arc::ptr_eq(&state.lookup("/a/w.txt").unwrap(), &entry));

        state.end_write("/a/w.txt");
        state.replace(HashMap::new());
        assert!(state.lookup("/a/w.txt").is_none());
    }

    #[tokio::test]
    async fn children_are_sorted_by_path() {
        let tree = seeded_tree().await;
        let mut state = tree.lock().await;
        let fresh = tree.fetch("/a", false).await.unwrap();
        state.replace(fresh);

        let names: Vec<_> = state
            .children_of("/a")
            .iter()
            .map(|e| e.name.clone())
            .collect();
        assert_eq!(names, vec!["b.txt".to_string(), "c".to_string()]);
    }
}
