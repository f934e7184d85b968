//! In-memory store implementations
//!
//! Used by tests and by local runs without external services. State does not
//! survive the process.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};

use super::{BlobStore, StateStore};
use crate::error::StoreResult;

/// Blob store backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<String, Value>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.blobs.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: &Value) -> StoreResult<()> {
        self.blobs.insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// Reported-state store backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    reported: DashMap<String, Map<String, Value>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn update_reported(
        &self,
        device: &str,
        attributes: Map<String, Value>,
    ) -> StoreResult<()> {
        self.reported
            .entry(device.to_string())
            .or_default()
            .extend(attributes);
        Ok(())
    }

    async fn get_reported(&self, device: &str) -> StoreResult<Option<Map<String, Value>>> {
        Ok(self.reported.get(device).map(|entry| entry.value().clone()))
    }
}
