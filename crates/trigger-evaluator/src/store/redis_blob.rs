//! Redis-backed blob store
//!
//! Each document is a JSON string under `{prefix}{key}`. Reads and writes go
//! through a [`ConnectionManager`], which reconnects on its own; errors are
//! returned to the caller rather than degraded, since the event log and
//! debounce records have no other source of truth.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::debug;

use super::BlobStore;
use crate::error::StoreResult;

/// Blob store on plain Redis string keys
#[derive(Clone)]
pub struct RedisBlobStore {
    redis: ConnectionManager,
    prefix: String,
}

impl RedisBlobStore {
    /// Create a new Redis blob store
    ///
    /// # Arguments
    ///
    /// * `redis` - Redis connection manager
    /// * `prefix` - Namespace prepended to every key (e.g. `fuzzy_trigger:blob:`)
    pub fn new(redis: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
        }
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl BlobStore for RedisBlobStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut conn = self.redis.clone();
        let redis_key = self.redis_key(key);

        let raw: Option<String> = conn.get(&redis_key).await?;

        match raw {
            Some(json) => {
                debug!(key = %redis_key, bytes = json.len(), "Blob loaded");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => {
                debug!(key = %redis_key, "Blob not found");
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, value: &Value) -> StoreResult<()> {
        let mut conn = self.redis.clone();
        let redis_key = self.redis_key(key);
        let json = serde_json::to_string(value)?;

        conn.set::<_, _, ()>(&redis_key, &json).await?;

        debug!(key = %redis_key, bytes = json.len(), "Blob stored");
        Ok(())
    }
}
