//! In-memory object store: the injected test double, also handy for local
//! development without a bucket.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::{Listing, ObjectInfo, ObjectStore};

struct StoredObject {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

/// Flat key → bytes map with S3-style delimiter grouping.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a key directly, bypassing the trait.
    pub async fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.objects.lock().await.insert(
            key.into(),
            StoredObject {
                data: data.into(),
                modified: Utc::now(),
            },
        );
    }

    /// Read a key's bytes directly, bypassing the trait.
    pub async fn get_data(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(key)
            .map(|stored| stored.data.clone())
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.lock().await.contains_key(key)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(
        &self,
        prefix: &str,
        delimiter: &str,
        _token: &str,
        max_keys: i32,
    ) -> Result<Listing, StoreError> {
        let objects = self.objects.lock().await;
        let mut listing = Listing::default();
        let mut prefixes = BTreeSet::new();

        for (key, stored) in objects.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            let remainder = &key[prefix.len()..];
            if !delimiter.is_empty() {
                if let Some(pos) = remainder.find(delimiter) {
                    prefixes.insert(key[..prefix.len() + pos + delimiter.len()].to_string());
                    continue;
                }
            }
            if listing.objects.len() < max_keys as usize {
                listing.objects.push(ObjectInfo {
                    key: key.clone(),
                    size: stored.data.len() as u64,
                    last_modified: Some(stored.modified),
                });
            }
        }

        listing.common_prefixes = prefixes.into_iter().collect();
        Ok(listing)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .lock()
            .await
            .get(key)
            .map(|stored| stored.data.clone())
            .ok_or_else(|| StoreError::new("get", key, "no such key"))
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.insert(key, data).await;
        Ok(())
    }

    async fn copy(&self, dest: &str, src: &str) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().await;
        let data = objects
            .get(src)
            .map(|stored| stored.data.clone())
            .ok_or_else(|| StoreError::new("copy", src, "no such key"))?;
        objects.insert(
            dest.to_string(),
            StoredObject {
                data,
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().await;
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    async fn signed_url(&self, key: &str, expiry: Duration) -> Result<String, StoreError> {
        Ok(format!("memory://{key}?expires={}", expiry.as_secs()))
    }
}
