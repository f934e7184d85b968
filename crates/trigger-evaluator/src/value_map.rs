//! Value lookup tables applied to incoming readings
//!
//! A request may name a beacon id in `value_map_beacon_to_class`; the
//! reading's value is then replaced by that beacon's entitlement class before
//! it is logged.

use shared::models::EventValue;
use std::collections::HashMap;

/// Immutable lookup tables, built once from configuration
#[derive(Debug, Clone, Default)]
pub struct ValueMaps {
    beacon_to_class: HashMap<String, String>,
}

impl ValueMaps {
    pub fn new(beacon_to_class: HashMap<String, String>) -> Self {
        Self { beacon_to_class }
    }

    /// Entitlement class of a beacon, `None` if the beacon is unknown
    pub fn beacon_class(&self, beacon: &str) -> Option<&str> {
        self.beacon_to_class.get(beacon).map(String::as_str)
    }

    /// Value to record for a reading
    ///
    /// # Errors
    ///
    /// Returns the unknown beacon id when a mapping is requested for a beacon
    /// the table does not know
    pub fn resolve_value(
        &self,
        value: &EventValue,
        beacon: Option<&str>,
    ) -> Result<EventValue, String> {
        match beacon {
            None => Ok(value.clone()),
            Some(beacon) => self
                .beacon_class(beacon)
                .map(EventValue::from)
                .ok_or_else(|| beacon.to_string()),
        }
    }
}
