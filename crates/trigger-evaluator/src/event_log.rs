//! Per-device event log
//!
//! Each device has one JSON array of event records under
//! `<device>_events.json`, in insertion order. Records are kept as raw JSON so
//! that a malformed record written by some other producer survives in storage
//! and is only skipped when the log is evaluated.
//!
//! # Retention
//!
//! Every ingestion prunes records older than the retention horizon (300s by
//! default). Pruning builds a filtered list and replaces the stored one.
//! Records without a parseable timestamp can never age out, so they are
//! dropped at prune time.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use shared::models::{parse_timestamp, Event};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::store::BlobStore;

/// Event log persisted through a [`BlobStore`]
pub struct EventLogStore {
    blobs: Arc<dyn BlobStore>,
    retention: Duration,
}

impl EventLogStore {
    /// Create an event log store
    ///
    /// # Arguments
    ///
    /// * `blobs` - Backing document store
    /// * `retention` - Age after which events are pruned
    pub fn new(blobs: Arc<dyn BlobStore>, retention: Duration) -> Self {
        Self { blobs, retention }
    }

    fn log_key(device: &str) -> String {
        format!("{}_events.json", device)
    }

    /// Stored records for a device, empty if the device has no log
    pub async fn events_for(&self, device: &str) -> StoreResult<Vec<Value>> {
        let records = match self.blobs.get(&Self::log_key(device)).await? {
            Some(Value::Array(records)) => records,
            Some(other) => {
                warn!(
                    device = device,
                    kind = json_kind(&other),
                    "Event log is not an array, treating as empty"
                );
                Vec::new()
            }
            None => Vec::new(),
        };
        Ok(records)
    }

    /// Append one event to the stored log, without pruning
    pub async fn append(&self, device: &str, event: &Event) -> StoreResult<()> {
        let mut records = self.events_for(device).await?;
        records.push(serde_json::to_value(event)?);
        self.save(device, records).await
    }

    /// Remove every stored event older than the retention horizon
    ///
    /// # Returns
    ///
    /// The surviving records
    pub async fn prune(&self, device: &str, now: DateTime<Utc>) -> StoreResult<Vec<Value>> {
        let records = self.events_for(device).await?;
        let kept = self.retain_recent(device, records, now);
        self.save(device, kept.clone()).await?;
        Ok(kept)
    }

    /// Load, append, prune and save in one read-modify-write
    ///
    /// # Returns
    ///
    /// The post-prune log, including the new event unless it is itself
    /// already past the horizon
    pub async fn ingest(
        &self,
        device: &str,
        event: &Event,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Value>> {
        let mut records = self.events_for(device).await?;
        records.push(serde_json::to_value(event)?);

        let kept = self.retain_recent(device, records, now);
        self.save(device, kept.clone()).await?;

        debug!(device = device, events = kept.len(), "Event log updated");
        Ok(kept)
    }

    async fn save(&self, device: &str, records: Vec<Value>) -> StoreResult<()> {
        self.blobs
            .put(&Self::log_key(device), &Value::Array(records))
            .await
    }

    fn retain_recent(&self, device: &str, records: Vec<Value>, now: DateTime<Utc>) -> Vec<Value> {
        let horizon = now - self.retention;
        let original_len = records.len();

        let kept: Vec<Value> = records
            .into_iter()
            .filter(|record| match record_timestamp(record) {
                Some(ts) => ts >= horizon,
                None => {
                    warn!(device = device, record = %record, "Dropping event without a valid timestamp");
                    false
                }
            })
            .collect();

        let pruned = original_len - kept.len();
        if pruned > 0 {
            debug!(device = device, pruned = pruned, remaining = kept.len(), "Pruned old events");
        }

        kept
    }
}

fn record_timestamp(record: &Value) -> Option<DateTime<Utc>> {
    record
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode stored records into events, skipping malformed ones
///
/// A record missing `attribute` or `value`, or carrying a value that is
/// neither a number nor a string, is logged and left out.
pub fn decode_events(device: &str, records: &[Value]) -> Vec<Event> {
    records
        .iter()
        .filter_map(|record| match serde_json::from_value::<Event>(record.clone()) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(device = device, record = %record, error = %e, "Skipping malformed event");
                None
            }
        })
        .collect()
}
