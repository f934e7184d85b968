//! Evaluation pipeline
//!
//! One call to [`TriggerProcessor::evaluate`] handles one inbound reading:
//!
//! 1. Validate the reading and the rule (rejections happen before any I/O)
//! 2. Apply value maps and append the event to the device log, pruning it
//! 3. Measure certainty over the rule's window
//! 4. Pending / BelowThreshold end here; Satisfied goes through the debounce
//!    gate and, unless suppressed, the effector
//! 5. Record the outcome (or rejection) in the audit log
//!
//! Every store call runs under the configured timeout. Store failures fail
//! the whole evaluation; nothing is retried.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use shared::models::{EvaluationRequest, Event, Rule, KEY_SEPARATOR};
use shared::EvaluatorConfig;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::audit_log::{AuditEntry, AuditLog};
use crate::debounce::DebounceGate;
use crate::device_lock::DeviceLocks;
use crate::effector::TriggerEffector;
use crate::error::EvaluationError;
use crate::evaluators::{Assessment, CertaintyEvaluator};
use crate::event_log::{decode_events, EventLogStore};
use crate::notifier::Notifier;
use crate::outcome::{Outcome, OutcomeKind};
use crate::store::{BlobStore, StateStore, TimedBlobStore, TimedStateStore};
use crate::value_map::ValueMaps;

/// A request that passed validation
struct Accepted {
    rule: Rule,
    event: Event,
    now: DateTime<Utc>,
}

/// Orchestrates one evaluation per inbound reading
pub struct TriggerProcessor {
    events: EventLogStore,
    debounce: DebounceGate,
    audit: AuditLog,
    effector: TriggerEffector,
    state: Arc<dyn StateStore>,
    value_maps: ValueMaps,
    locks: Option<DeviceLocks>,
}

impl TriggerProcessor {
    /// Create a processor
    ///
    /// Both stores are wrapped with the configured call timeout.
    ///
    /// # Arguments
    ///
    /// * `blobs` - Document store for event logs, debounce records and audit trails
    /// * `state` - Device reported-state store
    /// * `notifier` - Chat notification sink
    /// * `config` - Evaluation settings
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        state: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        config: &EvaluatorConfig,
    ) -> Self {
        let timeout = std::time::Duration::from_millis(config.store_timeout_ms);
        let blobs: Arc<dyn BlobStore> = Arc::new(TimedBlobStore::new(blobs, timeout));
        let state: Arc<dyn StateStore> = Arc::new(TimedStateStore::new(state, timeout));

        Self {
            events: EventLogStore::new(
                blobs.clone(),
                Duration::seconds(config.retention_secs as i64),
            ),
            debounce: DebounceGate::new(
                blobs.clone(),
                Duration::seconds(config.min_debounce_secs as i64),
            ),
            audit: AuditLog::new(blobs, config.audit_capacity),
            effector: TriggerEffector::new(state.clone(), notifier),
            state,
            value_maps: ValueMaps::new(config.beacon_to_class.clone()),
            locks: config.serialize_per_device.then(DeviceLocks::new),
        }
    }

    /// Evaluate one reading against the rule it carries
    ///
    /// # Errors
    ///
    /// - `BadRuleSpec` / `InvalidRequest` when the request is rejected
    /// - `StoreUnavailable` when a store call fails or times out
    pub async fn evaluate(&self, request: &EvaluationRequest) -> Result<Outcome, EvaluationError> {
        let start = Instant::now();

        let _guard = match &self.locks {
            Some(locks) => Some(locks.acquire(&request.device).await),
            None => None,
        };

        let result = self.run(request).await;
        let result = self.record_audit(request, result).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) => {
                info!(
                    device = %request.device,
                    trigger_name = %request.trigger_name,
                    outcome = %outcome.kind,
                    duration_ms = duration_ms,
                    "{}",
                    outcome.message
                );

                #[cfg(feature = "metrics")]
                metrics::counter!("trigger_evaluator.outcomes", "kind" => outcome.kind.as_str())
                    .increment(1);
            }
            Err(e) => {
                warn!(
                    device = %request.device,
                    trigger_name = %request.trigger_name,
                    error = %e,
                    duration_ms = duration_ms,
                    "Evaluation failed"
                );

                #[cfg(feature = "metrics")]
                metrics::counter!("trigger_evaluator.failures", "reason" => e.label()).increment(1);
            }
        }

        result
    }

    /// Audit trail for a device's trigger, oldest first
    pub async fn recent_outcomes(
        &self,
        device: &str,
        trigger_name: &str,
    ) -> Result<Vec<AuditEntry>, EvaluationError> {
        self.audit
            .recent(device, trigger_name)
            .await
            .map_err(EvaluationError::store("audit_log"))
    }

    /// Current reported state of a device
    pub async fn reported_state(
        &self,
        device: &str,
    ) -> Result<Option<Map<String, Value>>, EvaluationError> {
        self.state
            .get_reported(device)
            .await
            .map_err(EvaluationError::store("reported_state"))
    }

    fn accept(&self, request: &EvaluationRequest) -> Result<Accepted, EvaluationError> {
        request
            .validate_reading()
            .map_err(|e| EvaluationError::InvalidRequest(reason(e)))?;

        let rule = request
            .rule()
            .map_err(|e| EvaluationError::BadRuleSpec(reason(e)))?;

        let value = self
            .value_maps
            .resolve_value(&request.value, request.value_map_beacon_to_class.as_deref())
            .map_err(|beacon| {
                EvaluationError::BadRuleSpec(format!("unknown beacon in value_map_beacon_to_class: {}", beacon))
            })?;

        let now = request
            .event_time(Utc::now())
            .map_err(|e| EvaluationError::InvalidRequest(reason(e)))?;

        Ok(Accepted {
            event: Event::new(&request.device, &request.attribute, value, now),
            rule,
            now,
        })
    }

    async fn run(&self, request: &EvaluationRequest) -> Result<Outcome, EvaluationError> {
        let Accepted { rule, event, now } = self.accept(request)?;
        let device = request.device.as_str();

        let records = self
            .events
            .ingest(device, &event, now)
            .await
            .map_err(EvaluationError::store("event_log"))?;
        let events = decode_events(device, &records);

        let (assessment, report) = CertaintyEvaluator::from_rule(&rule).evaluate(&events, now);

        let kind = match assessment {
            Assessment::Pending => OutcomeKind::Pending,
            Assessment::BelowThreshold { .. } => OutcomeKind::BelowThreshold,
            Assessment::Satisfied { certainty } => {
                let suppressed = self
                    .debounce
                    .should_suppress(device, &rule.trigger_name, rule.period, now)
                    .await
                    .map_err(EvaluationError::store("debounce"))?;

                if suppressed {
                    OutcomeKind::Suppressed
                } else {
                    self.effector
                        .fire(device, &rule.trigger_name, certainty, now)
                        .await
                        .map_err(EvaluationError::store("reported_state"))?;
                    OutcomeKind::Fired
                }
            }
        };

        Ok(Outcome::new(kind, &rule.trigger_name, &report))
    }

    /// Append an audit entry for the result
    ///
    /// A failed audit write fails an otherwise successful evaluation; on an
    /// already failed evaluation it is only logged.
    async fn record_audit(
        &self,
        request: &EvaluationRequest,
        result: Result<Outcome, EvaluationError>,
    ) -> Result<Outcome, EvaluationError> {
        let addressable = |name: &str| !name.trim().is_empty() && !name.contains(KEY_SEPARATOR);
        if !addressable(&request.device) || !addressable(&request.trigger_name) {
            debug!("Request has no usable device or trigger name, not audited");
            return result;
        }

        let (label, message) = match &result {
            Ok(outcome) => (outcome.kind.as_str(), outcome.message.clone()),
            Err(e) => (e.label(), e.to_string()),
        };

        let snapshot = serde_json::to_value(request).unwrap_or(Value::Null);
        let entry = AuditEntry::new(snapshot, label, message, Utc::now());

        let recorded = self
            .audit
            .record(&request.device, &request.trigger_name, &entry)
            .await;

        match (result, recorded) {
            (result, Ok(())) => result,
            (Ok(_), Err(e)) => Err(EvaluationError::store("audit_log")(e)),
            (Err(original), Err(e)) => {
                warn!(
                    device = %request.device,
                    trigger_name = %request.trigger_name,
                    error = %e,
                    "Failed to record audit entry for failed evaluation"
                );
                Err(original)
            }
        }
    }
}

fn reason(err: shared::Error) -> String {
    match err {
        shared::Error::Validation(msg) => msg,
        other => other.to_string(),
    }
}
