//! In-memory result store for local runs and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainResult, RelaxError};
use crate::domain::ports::{ResultStore, StoreKey};

#[derive(Default)]
pub struct MemoryResultStore {
    blobs: Mutex<HashMap<StoreKey, Vec<u8>>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, key: &StoreKey) -> bool {
        self.blobs.lock().await.contains_key(key)
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn put(&self, key: &StoreKey, bytes: Vec<u8>, overwrite: bool) -> DomainResult<()> {
        let mut blobs = self.blobs.lock().await;
        if !overwrite && blobs.contains_key(key) {
            return Err(RelaxError::AlreadyExists(key.to_string()));
        }
        blobs.insert(key.clone(), bytes);
        Ok(())
    }

    async fn get(&self, key: &StoreKey) -> DomainResult<Vec<u8>> {
        self.blobs
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| RelaxError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &StoreKey) -> DomainResult<()> {
        self.blobs
            .lock()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| RelaxError::NotFound(key.to_string()))
    }
}
