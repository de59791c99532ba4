//! The contract the adapter needs from a flat-namespace object store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Keys requested per listing call. The adapter never walks past the
/// first page; prefixes with more keys than this are truncated.
pub const LIST_PAGE_SIZE: i32 = 1000;

/// One key returned by a listing call.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Result of a listing call: matching keys plus the common prefixes the
/// store grouped deeper keys into (when a delimiter was given).
#[derive(Debug, Default)]
pub struct Listing {
    pub objects: Vec<ObjectInfo>,
    pub common_prefixes: Vec<String>,
}

/// Backend operations the filesystem adapter is built on.
///
/// Injected into the tree cache and the operation handler at construction
/// so tests can substitute [`crate::MemoryStore`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List keys under `prefix`, at most `max_keys` of them. A non-empty
    /// `delimiter` makes the store group deeper keys into common
    /// prefixes. `token` continues a previous page; the adapter always
    /// passes it empty (single-page boundary, see [`LIST_PAGE_SIZE`]).
    async fn list(
        &self,
        prefix: &str,
        delimiter: &str,
        token: &str,
        max_keys: i32,
    ) -> Result<Listing, StoreError>;

    /// Fetch the full body of an object.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Overwrite an object with the given bytes.
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Server-side copy of `src` to `dest`.
    async fn copy(&self, dest: &str, src: &str) -> Result<(), StoreError>;

    /// Delete a single key.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Delete a batch of keys in one call.
    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError>;

    /// Produce a time-limited pre-signed download URL for `key`.
    async fn signed_url(&self, key: &str, expiry: Duration) -> Result<String, StoreError>;
}
