//! Trigger effector
//!
//! A fired trigger becomes a reported attribute of the device
//! (`{trigger_name: certainty, timestamp}`), where other rules can pick it up
//! as an input. The outcome of the write is announced on the device's chat
//! channel.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use shared::models::format_timestamp;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::StoreResult;
use crate::notifier::Notifier;
use crate::store::StateStore;

pub struct TriggerEffector {
    state: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
}

impl TriggerEffector {
    pub fn new(state: Arc<dyn StateStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { state, notifier }
    }

    /// Reported attributes written for a fire
    pub fn reported_attributes(
        trigger_name: &str,
        certainty: f64,
        now: DateTime<Utc>,
    ) -> Map<String, Value> {
        let mut attributes = Map::new();
        attributes.insert(trigger_name.to_string(), json!(certainty));
        attributes.insert("timestamp".to_string(), json!(format_timestamp(now)));
        attributes
    }

    /// Write the trigger into the device's reported state and announce it
    ///
    /// Notification failures are logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns the state store error if the write fails (after notifying)
    pub async fn fire(
        &self,
        device: &str,
        trigger_name: &str,
        certainty: f64,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let attributes = Self::reported_attributes(trigger_name, certainty, now);
        let result = self.state.update_reported(device, attributes).await;

        let text = match &result {
            Ok(()) => {
                info!(
                    device = device,
                    trigger_name = trigger_name,
                    certainty = certainty,
                    "Reported state updated"
                );
                format!(
                    "Device has set reported state successfully: {} = {}",
                    trigger_name, certainty
                )
            }
            Err(e) => {
                warn!(
                    device = device,
                    trigger_name = trigger_name,
                    error = %e,
                    "Failed to update reported state"
                );
                format!(
                    "Error: Device failed to set reported state {} = {}",
                    trigger_name, certainty
                )
            }
        };

        if let Err(e) = self.notifier.notify(device, &text).await {
            warn!(device = device, error = %e, "Chat notification failed");
        }

        result
    }
}
