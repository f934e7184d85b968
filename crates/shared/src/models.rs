//! Request, event and rule models
//!
//! An [`EvaluationRequest`] arrives as flat JSON carrying both the sensor
//! reading and the rule parameters. It is split into an [`Event`] (what gets
//! recorded in the device's log) and a [`Rule`] (what the log is checked
//! against). Rules are never persisted.

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Joins device and trigger names in store keys; neither may contain it
pub const KEY_SEPARATOR: char = '/';

/// Naive timestamps carry no offset and are read as UTC
const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Parse an ISO-8601 timestamp
///
/// Accepts RFC 3339 with an offset (`2024-05-01T10:00:00Z`) and naive
/// timestamps with optional fractional seconds (`2024-05-01T10:00:00.250000`).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, NAIVE_TIMESTAMP_FORMAT)
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Format a timestamp the way it is written back to stores
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Serde adapter for timestamps stored as ISO-8601 strings
pub mod timestamp_format {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw)))
    }
}

/// Attribute value reported by a sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Number(f64),
    Text(String),
}

impl EventValue {
    /// Numeric view of the value; numeric text is parsed
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EventValue::Number(n) => Some(*n),
            EventValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    /// Equality used by `trigger_value`
    ///
    /// Same-typed values compare directly. A number and a numeric string are
    /// equal when they denote the same number.
    pub fn loosely_equals(&self, other: &EventValue) -> bool {
        match (self, other) {
            (EventValue::Number(a), EventValue::Number(b)) => a == b,
            (EventValue::Text(a), EventValue::Text(b)) => a == b,
            _ => matches!((self.as_f64(), other.as_f64()), (Some(a), Some(b)) if a == b),
        }
    }
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventValue::Number(n) => write!(f, "{}", n),
            EventValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for EventValue {
    fn from(value: f64) -> Self {
        EventValue::Number(value)
    }
}

impl From<&str> for EventValue {
    fn from(value: &str) -> Self {
        EventValue::Text(value.to_string())
    }
}

/// A recorded sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Older log records may lack the device; the log key already identifies it
    #[serde(default)]
    pub device: String,
    pub attribute: String,
    pub value: EventValue,
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        device: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<EventValue>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            device: device.into(),
            attribute: attribute.into(),
            value: value.into(),
            timestamp,
        }
    }
}

/// Value conditions of a rule
///
/// Any subset may be set. They are checked in the order equals, above,
/// below; the first one that holds satisfies the event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub equals: Option<EventValue>,
    pub above: Option<f64>,
    pub below: Option<f64>,
}

impl Comparison {
    pub fn is_empty(&self) -> bool {
        self.equals.is_none() && self.above.is_none() && self.below.is_none()
    }

    /// Whether `value` satisfies this comparison
    pub fn matches(&self, value: &EventValue) -> bool {
        if let Some(expected) = &self.equals {
            if value.loosely_equals(expected) {
                return true;
            }
        }

        let numeric = value.as_f64();

        if let (Some(upper), Some(v)) = (self.above, numeric) {
            if v > upper {
                return true;
            }
        }

        if let (Some(lower), Some(v)) = (self.below, numeric) {
            if v < lower {
                return true;
            }
        }

        false
    }
}

/// A validated fuzzy trigger rule
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Reported-state attribute written when the rule fires
    pub trigger_name: String,
    /// Event attribute the rule looks at
    pub trigger_attribute: String,
    pub comparison: Comparison,
    /// Minimum fraction of matching events, in [0, 1]
    pub certainty: f64,
    /// Length of the evaluation window
    pub period: Duration,
}

/// Inbound evaluation request
///
/// The rule parameters are optional at the type level so that a request with
/// a missing parameter still deserializes and can be rejected with a
/// descriptive message (and audited).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub device: String,
    pub attribute: String,
    pub value: EventValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub trigger_name: String,
    pub trigger_attribute: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_value: Option<EventValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_upper_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_lower_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_certainty: Option<f64>,
    /// Window length in whole seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_period: Option<i64>,
    /// Beacon id whose entitlement class replaces `value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_map_beacon_to_class: Option<String>,
}

impl EvaluationRequest {
    /// Extract and validate the rule carried by this request
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` when a required parameter is missing or
    /// out of range, or when no comparison is supplied.
    pub fn rule(&self) -> Result<Rule> {
        if self.trigger_name.trim().is_empty() {
            return Err(Error::validation("trigger_name must not be empty"));
        }

        if self.trigger_name.contains(KEY_SEPARATOR) {
            return Err(Error::validation(format!(
                "trigger_name must not contain '{}'",
                KEY_SEPARATOR
            )));
        }

        if self.trigger_attribute.trim().is_empty() {
            return Err(Error::validation("trigger_attribute must not be empty"));
        }

        let comparison = Comparison {
            equals: self.trigger_value.clone(),
            above: self.trigger_upper_limit,
            below: self.trigger_lower_limit,
        };

        if comparison.is_empty() {
            return Err(Error::validation(
                "no comparison supplied: set trigger_value, trigger_upper_limit or trigger_lower_limit",
            ));
        }

        for (name, limit) in [
            ("trigger_upper_limit", comparison.above),
            ("trigger_lower_limit", comparison.below),
        ] {
            if matches!(limit, Some(l) if !l.is_finite()) {
                return Err(Error::validation(format!("{} must be a finite number", name)));
            }
        }

        let certainty = self
            .trigger_certainty
            .ok_or_else(|| Error::validation("trigger_certainty is required"))?;

        if !(0.0..=1.0).contains(&certainty) {
            return Err(Error::validation(format!(
                "trigger_certainty must be between 0 and 1, got {}",
                certainty
            )));
        }

        let period_secs = self
            .trigger_period
            .ok_or_else(|| Error::validation("trigger_period is required"))?;

        if period_secs < 0 {
            return Err(Error::validation(format!(
                "trigger_period must not be negative, got {}",
                period_secs
            )));
        }

        let period = Duration::try_seconds(period_secs).ok_or_else(|| {
            Error::validation(format!("trigger_period out of range, got {}", period_secs))
        })?;

        Ok(Rule {
            trigger_name: self.trigger_name.clone(),
            trigger_attribute: self.trigger_attribute.clone(),
            comparison,
            certainty,
            period,
        })
    }

    /// Timestamp of the reading, or `fallback` when the request carries none
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` when a timestamp is present but unparseable
    pub fn event_time(&self, fallback: DateTime<Utc>) -> Result<DateTime<Utc>> {
        match &self.timestamp {
            None => Ok(fallback),
            Some(raw) => parse_timestamp(raw)
                .ok_or_else(|| Error::validation(format!("invalid timestamp: {}", raw))),
        }
    }

    /// Check the fields identifying the reading itself
    pub fn validate_reading(&self) -> Result<()> {
        if self.device.trim().is_empty() {
            return Err(Error::validation("device must not be empty"));
        }

        if self.device.contains(KEY_SEPARATOR) {
            return Err(Error::validation(format!(
                "device must not contain '{}'",
                KEY_SEPARATOR
            )));
        }

        if self.attribute.trim().is_empty() {
            return Err(Error::validation("attribute must not be empty"));
        }

        Ok(())
    }
}
