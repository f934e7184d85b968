//! Shared library for the fuzzy trigger services
//!
//! This crate provides common functionality used by the evaluator library and worker:
//! - Request, event and rule models
//! - Error handling types
//! - Configuration management
//! - Logging infrastructure
//! - PostgreSQL and Redis connection helpers

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod redis;

// Re-export commonly used types
pub use config::{
    Config, DatabaseConfig, EvaluatorConfig, NotifierConfig, RedisConfig, StateStoreBackend,
    WorkerConfig,
};
pub use db::DbPool;
pub use error::{Error, Result};
pub use models::{Comparison, EvaluationRequest, Event, EventValue, Rule};

/// Initialize tracing subscriber for structured logging
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shared=debug,trigger_evaluator=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
