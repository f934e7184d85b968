//! Bounded audit trail of evaluation outcomes
//!
//! One JSON array per (device, trigger) under `<device>/<trigger>/audit.json`,
//! oldest first, truncated from the front to the configured capacity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::models::{timestamp_format, KEY_SEPARATOR};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::store::BlobStore;

/// One recorded evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// The request as received
    pub request: Value,
    /// Outcome kind or rejection label
    pub outcome: String,
    /// Human-readable outcome message
    pub message: String,
    #[serde(with = "timestamp_format")]
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        request: Value,
        outcome: impl Into<String>,
        message: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request,
            outcome: outcome.into(),
            message: message.into(),
            recorded_at,
        }
    }
}

/// Audit log persisted through a [`BlobStore`]
pub struct AuditLog {
    blobs: Arc<dyn BlobStore>,
    capacity: usize,
}

impl AuditLog {
    /// Create an audit log keeping at most `capacity` entries per trigger
    pub fn new(blobs: Arc<dyn BlobStore>, capacity: usize) -> Self {
        Self { blobs, capacity }
    }

    fn audit_key(device: &str, trigger_name: &str) -> String {
        format!("{device}{sep}{trigger_name}{sep}audit.json", sep = KEY_SEPARATOR)
    }

    async fn load(&self, key: &str) -> StoreResult<Vec<Value>> {
        Ok(match self.blobs.get(key).await? {
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                warn!(key = key, "Audit log is not an array, starting over");
                Vec::new()
            }
            None => Vec::new(),
        })
    }

    /// Append an entry, dropping the oldest beyond capacity
    pub async fn record(
        &self,
        device: &str,
        trigger_name: &str,
        entry: &AuditEntry,
    ) -> StoreResult<()> {
        let key = Self::audit_key(device, trigger_name);

        let mut entries = self.load(&key).await?;
        entries.push(serde_json::to_value(entry)?);

        if entries.len() > self.capacity {
            let excess = entries.len() - self.capacity;
            entries.drain(..excess);
        }

        self.blobs.put(&key, &Value::Array(entries)).await?;

        debug!(
            device = device,
            trigger_name = trigger_name,
            outcome = %entry.outcome,
            "Audit entry recorded"
        );
        Ok(())
    }

    /// Stored entries, oldest first
    pub async fn recent(&self, device: &str, trigger_name: &str) -> StoreResult<Vec<AuditEntry>> {
        let entries = self.load(&Self::audit_key(device, trigger_name)).await?;

        Ok(entries
            .into_iter()
            .filter_map(|raw| match serde_json::from_value(raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(device = device, trigger_name = trigger_name, error = %e, "Skipping malformed audit entry");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBlobStore;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn entry(n: i64) -> AuditEntry {
        AuditEntry::new(
            json!({ "seq": n }),
            "pending",
            format!("evaluation {}", n),
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::seconds(n),
        )
    }

    #[tokio::test]
    async fn test_recent_empty() {
        let log = AuditLog::new(Arc::new(InMemoryBlobStore::new()), 20);
        assert!(log.recent("g88_pi", "lot_is_occupied").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_appends_in_order() {
        let log = AuditLog::new(Arc::new(InMemoryBlobStore::new()), 20);
        log.record("g88_pi", "lot_is_occupied", &entry(1)).await.unwrap();
        log.record("g88_pi", "lot_is_occupied", &entry(2)).await.unwrap();

        let entries = log.recent("g88_pi", "lot_is_occupied").await.unwrap();
        assert_eq!(entries, vec![entry(1), entry(2)]);
    }

    #[tokio::test]
    async fn test_capacity_keeps_newest_twenty() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let log = AuditLog::new(blobs.clone(), 20);

        for n in 0..25 {
            log.record("g88_pi", "lot_is_occupied", &entry(n)).await.unwrap();
        }

        let entries = log.recent("g88_pi", "lot_is_occupied").await.unwrap();
        assert_eq!(entries.len(), 20);
        assert_eq!(entries.first().unwrap().request["seq"], json!(5));
        assert_eq!(entries.last().unwrap().request["seq"], json!(24));

        let stored = blobs
            .get("g88_pi/lot_is_occupied/audit.json")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.as_array().unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_logs_are_per_trigger() {
        let log = AuditLog::new(Arc::new(InMemoryBlobStore::new()), 20);
        log.record("g88_pi", "a", &entry(1)).await.unwrap();
        log.record("g88_pi", "b", &entry(2)).await.unwrap();

        assert_eq!(log.recent("g88_pi", "a").await.unwrap().len(), 1);
        assert_eq!(log.recent("g88_pi", "b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_underscored_names_do_not_share_log() {
        let log = AuditLog::new(Arc::new(InMemoryBlobStore::new()), 20);
        log.record("g88_pi", "lot", &entry(1)).await.unwrap();
        log.record("g88", "pi_lot", &entry(2)).await.unwrap();

        assert_eq!(log.recent("g88_pi", "lot").await.unwrap(), vec![entry(1)]);
        assert_eq!(log.recent("g88", "pi_lot").await.unwrap(), vec![entry(2)]);
    }

    #[tokio::test]
    async fn test_malformed_entries_skipped_on_read() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        blobs
            .put("g88_pi/t/audit.json", &json!([{"outcome": "fired"}]))
            .await
            .unwrap();

        let log = AuditLog::new(blobs, 20);
        log.record("g88_pi", "t", &entry(1)).await.unwrap();

        assert_eq!(log.recent("g88_pi", "t").await.unwrap(), vec![entry(1)]);
    }
}
