//! Object-store gateway.
//!
//! A thin contract over an S3-compatible bucket: presigned PUT/GET URLs,
//! HEAD, existence checks, and idempotent deletes. The rest of the system
//! never touches the SDK directly — the upload manager and resolver talk to
//! [`ObjectStore`], which keeps S3 swappable for the in-memory store in
//! local development and tests.

pub mod memory;
pub mod s3;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{StorageConfig, StorageDriver};
use crate::error::ApiError;

/// Failure kinds a gateway operation can produce. The API surface translates
/// these into `storage_unavailable` / `not_found` at the edge.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object storage is not configured: missing {0}")]
    NotConfigured(&'static str),

    #[error("object '{0}' not found")]
    NotFound(String),

    #[error("object storage transport failure: {0}")]
    Transport(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => ApiError::not_found(format!("object '{key}'")),
            other => ApiError::StorageUnavailable(other.to_string()),
        }
    }
}

/// Metadata returned by a HEAD call.
#[derive(Debug, Clone, Copy)]
pub struct ObjectMeta {
    pub size: i64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Time-bounded URL authorising a single PUT of `key`.
    ///
    /// When `content_type` is given it is folded into the signature — the
    /// uploader must send the identical `Content-Type` header or the store
    /// rejects the PUT with a signature mismatch.
    async fn presign_put(
        &self,
        key: &str,
        ttl: Duration,
        content_type: Option<&str>,
    ) -> Result<String, StoreError>;

    /// Time-bounded URL authorising a single GET of `key`.
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StoreError>;

    /// Stable public URL for `key`, present iff a public base URL is
    /// configured. Preferred over long-lived signed GETs when available.
    fn public_url(&self, key: &str) -> Option<String>;

    /// Size of the stored object; `NotFound` if it does not exist.
    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        match self.head(key).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Idempotent delete — a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Object key for an update artifact: `<slug>/releases/<version>/<filename>`.
pub fn artifact_key(app_slug: &str, version: &str, filename: &str) -> String {
    format!("{app_slug}/releases/{version}/{filename}")
}

/// Object key for an installer: `<slug>/installers/<version>/<filename>`.
pub fn installer_key(app_slug: &str, version: &str, filename: &str) -> String {
    format!("{app_slug}/installers/{version}/{filename}")
}

/// Build the configured gateway.
pub async fn from_config(cfg: &StorageConfig) -> Arc<dyn ObjectStore> {
    match cfg.driver {
        StorageDriver::Memory => Arc::new(memory::MemoryObjectStore::new(
            cfg.public_base_url.clone(),
        )),
        StorageDriver::S3 => Arc::new(s3::S3ObjectStore::new(cfg).await),
    }
}
