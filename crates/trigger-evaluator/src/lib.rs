//! Fuzzy trigger evaluator library
//!
//! Evaluates whether a rolling window of device readings satisfies a
//! percentage-based rule and, when it does, writes the trigger back into the
//! device's reported state where other rules can observe it.
//!
//! The entry point is [`TriggerProcessor::evaluate`]; the worker binary feeds
//! it requests popped from Redis.

pub mod audit_log;
pub mod consumer;
pub mod debounce;
pub mod device_lock;
pub mod effector;
pub mod error;
pub mod evaluators;
pub mod event_log;
pub mod notifier;
pub mod outcome;
pub mod processor;
pub mod store;
pub mod value_map;
pub mod worker;

// Re-export commonly used types
pub use audit_log::{AuditEntry, AuditLog};
pub use consumer::{RedisRequestConsumer, RequestConsumer};
pub use error::{EvaluationError, NotifyError, StoreError, StoreResult};
pub use evaluators::{Assessment, CertaintyEvaluator, CertaintyReport};
pub use notifier::{ChannelRouter, LogNotifier, Notifier, WebhookNotifier};
pub use outcome::{Outcome, OutcomeKind};
pub use processor::TriggerProcessor;
pub use store::{BlobStore, StateStore};
pub use worker::{Worker, WorkerStats};
