use serde_json::Value;

use crate::core::EntityError;
use crate::entities::dictionary::{Dictionary, required_f64, required_i64, required_str};

/// An objective numeric measurement, e.g. "number of output tokens".
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub key: String,
    pub value: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub step: i64,
}

impl Metric {
    pub fn new(key: impl Into<String>, value: f64, timestamp: i64, step: i64) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp,
            step,
        }
    }

    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert("key".to_string(), Value::from(self.key.clone()));
        dict.insert("value".to_string(), Value::from(self.value));
        dict.insert("timestamp".to_string(), Value::from(self.timestamp));
        dict.insert("step".to_string(), Value::from(self.step));
        dict
    }

    pub fn from_dictionary(dict: &Dictionary) -> Result<Self, EntityError> {
        Ok(Self {
            key: required_str(dict, "key")?,
            value: required_f64(dict, "value")?,
            timestamp: required_i64(dict, "timestamp")?,
            step: required_i64(dict, "step")?,
        })
    }
}
