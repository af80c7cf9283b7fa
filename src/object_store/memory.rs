//! In-memory gateway for local development and tests.
//!
//! Holds object bytes in a map. "Presigned" URLs are synthetic `memory://`
//! URIs — good enough to assert against in tests, and a visible tell in logs
//! if the memory driver ever ends up in a real deployment.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ObjectMeta, ObjectStore, StoreError};

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    public_base_url: Option<String>,
}

impl MemoryObjectStore {
    pub fn new(public_base_url: Option<String>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            public_base_url,
        }
    }

    /// Simulate the client-side PUT that normally follows a presign call.
    pub async fn put(&self, key: &str, bytes: Vec<u8>) {
        self.objects.write().await.insert(key.to_string(), bytes);
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn presign_put(
        &self,
        key: &str,
        ttl: Duration,
        content_type: Option<&str>,
    ) -> Result<String, StoreError> {
        let ct = content_type.unwrap_or("application/octet-stream");
        Ok(format!(
            "memory://put/{key}?ttl={}&content-type={ct}",
            ttl.as_secs()
        ))
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        Ok(format!("memory://get/{key}?ttl={}", ttl.as_secs()))
    }

    fn public_url(&self, key: &str) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{base}/{key}"))
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        match self.objects.read().await.get(key) {
            Some(bytes) => Ok(ObjectMeta {
                size: bytes.len() as i64,
            }),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.write().await.remove(key);
        Ok(())
    }
}
