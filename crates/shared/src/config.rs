//! Configuration management using environment variables
//!
//! Every setting has a default so a bare `.env` is enough for local runs.
//! Lookup tables (beacon classes, chat channel overrides) are read as
//! comma-separated `key=value` pairs, e.g. `BEACON_CLASS_MAP="a123=A,a456=B"`.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Redis configuration (blob store and request queue)
    pub redis: RedisConfig,

    /// Which backend holds device reported state
    pub state_store: StateStoreBackend,

    /// Database configuration, present only for the PostgreSQL state backend
    pub database: Option<DatabaseConfig>,

    /// Evaluation pipeline settings
    pub evaluator: EvaluatorConfig,

    /// Chat notification settings
    pub notifier: NotifierConfig,

    /// Request consumer settings
    pub worker: WorkerConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database host
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database name
    pub name: String,

    /// Database user
    pub user: String,

    /// Database password
    pub password: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to keep warm
    pub min_connections: u32,

    /// Connection acquire timeout in seconds (fail fast if pool exhausted)
    pub acquire_timeout_secs: u64,

    /// SSL mode for database connection
    /// Options: disable, allow, prefer, require, verify-ca, verify-full
    pub ssl_mode: String,
}

impl DatabaseConfig {
    /// Build a PostgreSQL connection URL with SSL mode
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.name, self.ssl_mode
        )
    }
}

/// Redis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis host
    pub host: String,

    /// Redis port
    pub port: u16,

    /// Redis password (optional)
    pub password: Option<String>,

    /// Direct Redis URL (takes precedence over host/port/password)
    /// Supports both `redis://` and `rediss://` (TLS) schemes
    pub url: Option<String>,
}

impl RedisConfig {
    /// Build a Redis connection URL
    ///
    /// If `url` is set (from REDIS_URL env var), uses that directly.
    /// Otherwise, builds URL from host/port/password components.
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        if let Some(password) = &self.password {
            format!("redis://:{}@{}:{}", password, self.host, self.port)
        } else {
            format!("redis://{}:{}", self.host, self.port)
        }
    }
}

/// Device reported-state backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateStoreBackend {
    /// `device_shadows` table with JSONB merge
    Postgres,
    /// Shadow document kept in the Redis blob store
    Redis,
    /// AWS IoT device shadow (requires the `aws-shadow` feature)
    Aws,
}

impl FromStr for StateStoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "redis" => Ok(Self::Redis),
            "aws" | "aws-iot" => Ok(Self::Aws),
            other => Err(Error::config(format!(
                "Invalid STATE_STORE_BACKEND: {} (expected postgres, redis or aws)",
                other
            ))),
        }
    }
}

impl fmt::Display for StateStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateStoreBackend::Postgres => write!(f, "postgres"),
            StateStoreBackend::Redis => write!(f, "redis"),
            StateStoreBackend::Aws => write!(f, "aws"),
        }
    }
}

/// Evaluation pipeline settings
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluatorConfig {
    /// Events older than this are pruned from a device's log on every ingestion
    pub retention_secs: u64,

    /// Lower bound for the debounce window, whatever the trigger period
    pub min_debounce_secs: u64,

    /// Audit entries kept per (device, trigger)
    pub audit_capacity: usize,

    /// Timeout applied to every store call
    pub store_timeout_ms: u64,

    /// Serialize evaluations of the same device within this process
    pub serialize_per_device: bool,

    /// Beacon id -> entitlement class, used by `value_map_beacon_to_class`
    pub beacon_to_class: HashMap<String, String>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            retention_secs: 300,
            min_debounce_secs: 30,
            audit_capacity: 20,
            store_timeout_ms: 5_000,
            serialize_per_device: true,
            beacon_to_class: default_beacon_classes(),
        }
    }
}

/// Chat notification settings
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Incoming-webhook URL; messages are only logged when unset
    pub webhook_url: Option<String>,

    /// Channel used when the device name carries no group prefix
    pub default_channel: String,

    /// Channel name replacements, applied after prefix extraction
    pub channel_overrides: HashMap<String, String>,

    /// Webhook request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            default_channel: "g88a".to_string(),
            channel_overrides: HashMap::from([("g88".to_string(), "g88a".to_string())]),
            timeout_secs: 10,
        }
    }
}

/// Request consumer settings
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Redis list the worker pops evaluation requests from
    pub queue_name: String,

    /// BRPOP timeout in seconds
    pub poll_timeout_secs: u64,

    /// Prefix for every blob key written to Redis
    pub key_prefix: String,

    /// AWS IoT data-plane endpoint for the `aws` state backend
    /// (account default endpoint when unset)
    pub iot_endpoint: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_name: "fuzzy_trigger:requests".to_string(),
            poll_timeout_secs: 5,
            key_prefix: "fuzzy_trigger:blob:".to_string(),
            iot_endpoint: None,
        }
    }
}

fn default_beacon_classes() -> HashMap<String, String> {
    HashMap::from([
        ("a123".to_string(), "A".to_string()),
        ("a456".to_string(), "B".to_string()),
        ("a789".to_string(), "C".to_string()),
    ])
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let state_store: StateStoreBackend = env::var("STATE_STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let database = match state_store {
            StateStoreBackend::Postgres => Some(Self::load_database_config()?),
            _ => None,
        };

        let evaluator_defaults = EvaluatorConfig::default();
        let notifier_defaults = NotifierConfig::default();
        let worker_defaults = WorkerConfig::default();

        Ok(Self {
            redis: RedisConfig {
                host: env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: env_or("REDIS_PORT", 6379)?,
                password: env::var("REDIS_PASSWORD").ok(),
                url: env::var("REDIS_URL").ok(),
            },
            state_store,
            database,
            evaluator: EvaluatorConfig {
                retention_secs: env_or("EVENT_RETENTION_SECS", evaluator_defaults.retention_secs)?,
                min_debounce_secs: env_or(
                    "MIN_DEBOUNCE_SECS",
                    evaluator_defaults.min_debounce_secs,
                )?,
                audit_capacity: env_or("AUDIT_CAPACITY", evaluator_defaults.audit_capacity)?,
                store_timeout_ms: env_or("STORE_TIMEOUT_MS", evaluator_defaults.store_timeout_ms)?,
                serialize_per_device: env_or(
                    "SERIALIZE_PER_DEVICE",
                    evaluator_defaults.serialize_per_device,
                )?,
                beacon_to_class: match env::var("BEACON_CLASS_MAP") {
                    Ok(raw) => parse_pairs("BEACON_CLASS_MAP", &raw)?,
                    Err(_) => evaluator_defaults.beacon_to_class,
                },
            },
            notifier: NotifierConfig {
                webhook_url: env::var("CHAT_WEBHOOK_URL").ok().filter(|u| !u.is_empty()),
                default_channel: env::var("CHAT_DEFAULT_CHANNEL")
                    .unwrap_or(notifier_defaults.default_channel),
                channel_overrides: match env::var("CHAT_CHANNEL_OVERRIDES") {
                    Ok(raw) => parse_pairs("CHAT_CHANNEL_OVERRIDES", &raw)?,
                    Err(_) => notifier_defaults.channel_overrides,
                },
                timeout_secs: env_or("CHAT_TIMEOUT_SECS", notifier_defaults.timeout_secs)?,
            },
            worker: WorkerConfig {
                queue_name: env::var("REQUEST_QUEUE").unwrap_or(worker_defaults.queue_name),
                poll_timeout_secs: env_or(
                    "REQUEST_POLL_TIMEOUT_SECS",
                    worker_defaults.poll_timeout_secs,
                )?,
                key_prefix: env::var("BLOB_KEY_PREFIX").unwrap_or(worker_defaults.key_prefix),
                iot_endpoint: env::var("AWS_IOT_ENDPOINT").ok().filter(|e| !e.is_empty()),
            },
        })
    }

    fn load_database_config() -> Result<DatabaseConfig> {
        Ok(DatabaseConfig {
            host: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env_or("DB_PORT", 5432)?,
            name: env::var("DB_NAME").unwrap_or_else(|_| "fuzzy_trigger".to_string()),
            user: env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: env::var("DB_PASSWORD")
                .map_err(|_| Error::config("DB_PASSWORD must be set"))?,
            max_connections: env_or("DB_MAX_CONNECTIONS", 10)?,
            min_connections: env_or("DB_MIN_CONNECTIONS", 1)?,
            acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT", 5)?,
            ssl_mode: env::var("DB_SSL_MODE").unwrap_or_else(|_| {
                if cfg!(debug_assertions) {
                    "prefer".to_string()
                } else {
                    "verify-full".to_string()
                }
            }),
        })
    }
}

/// Read and parse an environment variable, falling back to `default` when unset
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

/// Parse `key=value` pairs separated by commas
///
/// Empty segments are ignored so trailing commas are harmless.
pub fn parse_pairs(name: &str, raw: &str) -> Result<HashMap<String, String>> {
    let mut pairs = HashMap::new();

    for segment in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, value) = segment
            .split_once('=')
            .ok_or_else(|| Error::config(format!("Invalid {} entry: {}", name, segment)))?;

        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(Error::config(format!(
                "Invalid {} entry: {} (empty key or value)",
                name, segment
            )));
        }

        pairs.insert(key.to_string(), value.to_string());
    }

    Ok(pairs)
}
