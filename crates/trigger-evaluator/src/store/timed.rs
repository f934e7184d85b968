//! Deadline wrappers for store calls
//!
//! Stores are reached over the network and must never block an evaluation
//! indefinitely. A timeout surfaces as [`StoreError::Timeout`]; nothing is
//! retried.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{BlobStore, StateStore};
use crate::error::{StoreError, StoreResult};

async fn with_deadline<T, F>(operation: &'static str, timeout: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation = operation,
                timeout_ms = timeout.as_millis() as u64,
                "Store call timed out"
            );
            Err(StoreError::Timeout {
                operation,
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

/// [`BlobStore`] whose calls fail after a fixed deadline
pub struct TimedBlobStore {
    inner: Arc<dyn BlobStore>,
    timeout: Duration,
}

impl TimedBlobStore {
    pub fn new(inner: Arc<dyn BlobStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl BlobStore for TimedBlobStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        with_deadline("blob_get", self.timeout, self.inner.get(key)).await
    }

    async fn put(&self, key: &str, value: &Value) -> StoreResult<()> {
        with_deadline("blob_put", self.timeout, self.inner.put(key, value)).await
    }
}

/// [`StateStore`] whose calls fail after a fixed deadline
pub struct TimedStateStore {
    inner: Arc<dyn StateStore>,
    timeout: Duration,
}

impl TimedStateStore {
    pub fn new(inner: Arc<dyn StateStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl StateStore for TimedStateStore {
    async fn update_reported(
        &self,
        device: &str,
        attributes: Map<String, Value>,
    ) -> StoreResult<()> {
        with_deadline(
            "state_update",
            self.timeout,
            self.inner.update_reported(device, attributes),
        )
        .await
    }

    async fn get_reported(&self, device: &str) -> StoreResult<Option<Map<String, Value>>> {
        with_deadline("state_get", self.timeout, self.inner.get_reported(device)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBlobStore;
    use serde_json::json;

    /// Blob store that never answers
    struct StalledBlobStore;

    #[async_trait]
    impl BlobStore for StalledBlobStore {
        async fn get(&self, _key: &str) -> StoreResult<Option<Value>> {
            std::future::pending().await
        }

        async fn put(&self, _key: &str, _value: &Value) -> StoreResult<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_passes_through_within_deadline() {
        let store = TimedBlobStore::new(
            Arc::new(InMemoryBlobStore::new()),
            Duration::from_millis(500),
        );
        store.put("k", &json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_stalled_store() {
        let store = TimedBlobStore::new(Arc::new(StalledBlobStore), Duration::from_millis(100));

        let err = store.get("k").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Timeout {
                operation: "blob_get",
                timeout_ms: 100
            }
        ));
    }
}
