//! Store abstractions
//!
//! The evaluator keeps no state in process. Everything it needs between
//! invocations lives behind two narrow traits:
//!
//! - [`BlobStore`]: named JSON documents (event logs, debounce records,
//!   audit trails)
//! - [`StateStore`]: a device's reported state, which other rules observe
//!
//! Both are wrapped in [`TimedBlobStore`] / [`TimedStateStore`] by the
//! processor so that every call has a caller-enforced deadline.

mod blob_state;
mod memory;
mod postgres_state;
mod redis_blob;
mod timed;

#[cfg(feature = "aws-shadow")]
mod aws_shadow;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreResult;

pub use blob_state::BlobStateStore;
pub use memory::{InMemoryBlobStore, InMemoryStateStore};
pub use postgres_state::PostgresStateStore;
pub use redis_blob::RedisBlobStore;
pub use timed::{TimedBlobStore, TimedStateStore};

#[cfg(feature = "aws-shadow")]
pub use aws_shadow::AwsShadowStore;

/// Named JSON document storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a document, `None` if it does not exist
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Create or replace a document
    async fn put(&self, key: &str, value: &Value) -> StoreResult<()>;
}

/// Device-shadow style reported state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Merge `attributes` into the device's reported state
    async fn update_reported(&self, device: &str, attributes: Map<String, Value>)
        -> StoreResult<()>;

    /// Current reported state, `None` if the device has none yet
    async fn get_reported(&self, device: &str) -> StoreResult<Option<Map<String, Value>>>;
}
