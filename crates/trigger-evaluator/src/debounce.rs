//! Debounce gate
//!
//! A trigger may fire at most once per `max(trigger_period, floor)` for a
//! device. The last fire time is kept in `<device>/<trigger>/trigger.json` as
//! `{"timestamp": "..."}`. Device and trigger names never contain `/`, so
//! each (device, trigger) pair owns its own record.
//!
//! The record is anchored at the fire that opened the window: a suppressed
//! check leaves it untouched, so a steady stream of satisfied evaluations
//! still fires once per window instead of being locked out indefinitely.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use shared::models::{format_timestamp, parse_timestamp, KEY_SEPARATOR};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::store::BlobStore;

/// Per (device, trigger) cooldown tracker
pub struct DebounceGate {
    blobs: Arc<dyn BlobStore>,
    min_floor: Duration,
}

impl DebounceGate {
    /// Create a debounce gate
    ///
    /// # Arguments
    ///
    /// * `blobs` - Backing document store
    /// * `min_floor` - Shortest allowed spacing between fires (30s by default)
    pub fn new(blobs: Arc<dyn BlobStore>, min_floor: Duration) -> Self {
        Self { blobs, min_floor }
    }

    fn record_key(device: &str, trigger_name: &str) -> String {
        format!("{device}{sep}{trigger_name}{sep}trigger.json", sep = KEY_SEPARATOR)
    }

    /// Last recorded fire time, `None` if absent or unreadable
    pub async fn last_fired(
        &self,
        device: &str,
        trigger_name: &str,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        let Some(record) = self.blobs.get(&Self::record_key(device, trigger_name)).await? else {
            return Ok(None);
        };

        let last = record
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_timestamp);

        if last.is_none() {
            warn!(
                device = device,
                trigger_name = trigger_name,
                record = %record,
                "Unreadable debounce record, treating as absent"
            );
        }

        Ok(last)
    }

    /// Decide whether a fire at `now` must be suppressed
    ///
    /// Returns `true` when the trigger fired less than
    /// `max(period, min_floor)` ago. Otherwise records `now` as the new fire
    /// time and returns `false`.
    pub async fn should_suppress(
        &self,
        device: &str,
        trigger_name: &str,
        period: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let floor = period.max(self.min_floor);

        if let Some(last) = self.last_fired(device, trigger_name).await? {
            // A window ending past the latest representable instant never ends
            let cooling = last
                .checked_add_signed(floor)
                .map_or(true, |until| until > now);

            if cooling {
                debug!(
                    device = device,
                    trigger_name = trigger_name,
                    last_fired = %format_timestamp(last),
                    floor_secs = floor.num_seconds(),
                    "Trigger fired recently, suppressing"
                );
                return Ok(true);
            }
        }

        self.blobs
            .put(
                &Self::record_key(device, trigger_name),
                &json!({ "timestamp": format_timestamp(now) }),
            )
            .await?;

        debug!(device = device, trigger_name = trigger_name, "Debounce record updated");
        Ok(false)
    }
}
