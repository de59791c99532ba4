//! Object store backed by an S3-compatible endpoint via aws-sdk-s3.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::StoreError;
use crate::store::{Listing, ObjectInfo, ObjectStore};

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    /// Endpoint URL, e.g. `https://oss-cn-hangzhou.aliyuncs.com`.
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub access_key_secret: String,
}

/// [`ObjectStore`] implementation over a single bucket.
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client for the configured endpoint. Credentials are static;
    /// no provider chain is consulted.
    pub async fn connect(config: S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id,
            config.access_key_secret,
            None,
            None,
            "ossbridge",
        );
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region))
            .endpoint_url(config.endpoint.clone())
            .credentials_provider(credentials)
            .load()
            .await;
        info!(endpoint = %config.endpoint, bucket = %config.bucket, "object store client ready");
        Self {
            client: Client::new(&sdk_config),
            bucket: config.bucket,
        }
    }

    fn err(op: &'static str, key: &str, cause: impl std::error::Error) -> StoreError {
        StoreError::new(op, key, format!("{}", DisplayErrorContext(&cause)))
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(
        &self,
        prefix: &str,
        delimiter: &str,
        token: &str,
        max_keys: i32,
    ) -> Result<Listing, StoreError> {
        let mut req = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(max_keys);
        if !delimiter.is_empty() {
            req = req.delimiter(delimiter);
        }
        if !token.is_empty() {
            req = req.continuation_token(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| Self::err("list", prefix, e))?;

        let mut listing = Listing::default();
        for object in resp.contents() {
            let Some(key) = object.key() else { continue };
            listing.objects.push(ObjectInfo {
                key: key.to_string(),
                size: object.size().unwrap_or(0).max(0) as u64,
                last_modified: object.last_modified().and_then(to_chrono),
            });
        }
        for common in resp.common_prefixes() {
            if let Some(p) = common.prefix() {
                listing.common_prefixes.push(p.to_string());
            }
        }
        Ok(listing)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::err("get", key, e))?;
        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| Self::err("get", key, e))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(data.to_vec().into())
            .send()
            .await
            .map_err(|e| Self::err("put", key, e))?;
        Ok(())
    }

    async fn copy(&self, dest: &str, src: &str) -> Result<(), StoreError> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, src))
            .key(dest)
            .send()
            .await
            .map_err(|e| Self::err("copy", src, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::err("delete", key, e))?;
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            let id = ObjectIdentifier::builder()
                .key(key)
                .build()
                .map_err(|e| Self::err("delete_many", key, e))?;
            objects.push(id);
        }
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| Self::err("delete_many", &keys[0], e))?;
        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| Self::err("delete_many", &keys[0], e))?;
        Ok(())
    }

    async fn signed_url(&self, key: &str, expiry: Duration) -> Result<String, StoreError> {
        let presigning = PresigningConfig::expires_in(expiry)
            .map_err(|e| Self::err("sign", key, e))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| Self::err("sign", key, e))?;
        Ok(presigned.uri().to_string())
    }
}
