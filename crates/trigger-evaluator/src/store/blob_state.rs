//! Reported state kept as a shadow document in a blob store
//!
//! The document mirrors the device-shadow layout so that tools reading it
//! see the same shape an IoT shadow service returns:
//!
//! ```json
//! { "state": { "reported": { "lot_is_occupied": 0.8, "timestamp": "..." } } }
//! ```

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::{BlobStore, StateStore};
use crate::error::StoreResult;

/// State store layered over any [`BlobStore`]
pub struct BlobStateStore {
    blobs: Arc<dyn BlobStore>,
}

impl BlobStateStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    fn shadow_key(device: &str) -> String {
        format!("{}_shadow.json", device)
    }
}

fn reported_of(document: &Value) -> Option<Map<String, Value>> {
    document
        .get("state")
        .and_then(|state| state.get("reported"))
        .and_then(Value::as_object)
        .cloned()
}

#[async_trait]
impl StateStore for BlobStateStore {
    async fn update_reported(
        &self,
        device: &str,
        attributes: Map<String, Value>,
    ) -> StoreResult<()> {
        let key = Self::shadow_key(device);

        let mut reported = match self.blobs.get(&key).await? {
            Some(document) => reported_of(&document).unwrap_or_default(),
            None => Map::new(),
        };
        reported.extend(attributes);

        self.blobs
            .put(&key, &json!({ "state": { "reported": reported } }))
            .await
    }

    async fn get_reported(&self, device: &str) -> StoreResult<Option<Map<String, Value>>> {
        Ok(self
            .blobs
            .get(&Self::shadow_key(device))
            .await?
            .as_ref()
            .and_then(reported_of))
    }
}
