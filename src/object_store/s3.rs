//! S3-compatible gateway implementation.
//!
//! Works against AWS S3, Cloudflare R2, and MinIO (path-style addressing,
//! custom endpoint). Presigning is computation-only and does not consume a
//! connection.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use tracing::warn;

use super::{ObjectMeta, ObjectStore, StoreError};
use crate::config::StorageConfig;

pub struct S3ObjectStore {
    client: Client,
    /// None when the deployment never configured a bucket; every operation
    /// then fails with `NotConfigured` and surfaces as 502.
    bucket: Option<String>,
    public_base_url: Option<String>,
}

impl S3ObjectStore {
    pub async fn new(cfg: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = cfg.region.clone() {
            loader = loader.region(Region::new(region));
        }
        if let (Some(ak), Some(sk)) = (cfg.access_key_id.clone(), cfg.secret_access_key.clone()) {
            loader = loader.credentials_provider(Credentials::new(ak, sk, None, None, "oasis"));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared).force_path_style(true);
        if let Some(endpoint) = &cfg.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if cfg.bucket.is_none() {
            warn!("no S3 bucket configured — uploads will fail until storage is set up");
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: cfg.bucket.clone(),
            public_base_url: cfg.public_base_url.clone(),
        }
    }

    fn bucket(&self) -> Result<&str, StoreError> {
        self.bucket
            .as_deref()
            .ok_or(StoreError::NotConfigured("bucket"))
    }

    fn presign_cfg(ttl: Duration) -> Result<PresigningConfig, StoreError> {
        PresigningConfig::expires_in(ttl).map_err(|e| StoreError::Transport(e.to_string()))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn presign_put(
        &self,
        key: &str,
        ttl: Duration,
        content_type: Option<&str>,
    ) -> Result<String, StoreError> {
        let bucket = self.bucket()?;
        let req = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string));
        let presigned = req
            .presigned(Self::presign_cfg(ttl)?)
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(presigned.uri().to_string())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        let bucket = self.bucket()?;
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(Self::presign_cfg(ttl)?)
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(presigned.uri().to_string())
    }

    fn public_url(&self, key: &str) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{base}/{key}"))
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        let bucket = self.bucket()?;
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(out) => Ok(ObjectMeta {
                size: out.content_length().unwrap_or(0),
            }),
            Err(err) => {
                let service = err.as_service_error();
                if service.map(|e| e.is_not_found()).unwrap_or(false) {
                    Err(StoreError::NotFound(key.to_string()))
                } else {
                    Err(StoreError::Transport(err.to_string()))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let bucket = self.bucket()?;
        // S3 DELETE of a missing key is already a success, which matches the
        // idempotent contract.
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(())
    }
}
