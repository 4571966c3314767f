/// Failure while rebuilding an entity from its dictionary form.
///
/// Only the mandatory keys are checked for presence. A key that is present but
/// holds the wrong JSON type is reported as [`InvalidType`](EntityError::InvalidType)
/// at the point the value is read.
#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    /// A mandatory key is absent from the dictionary.
    #[error("missing required key `{key}`")]
    MissingKey { key: String },

    /// The key exists but its value does not have the expected shape.
    #[error("key `{key}` must be {expected}, got {found}")]
    InvalidType {
        key: String,
        expected: &'static str,
        found: String,
    },

    /// The input was not a JSON document, or not a JSON object.
    #[error("invalid entity JSON")]
    Json(#[from] serde_json::Error),
}

impl EntityError {
    pub(crate) fn missing(key: &str) -> Self {
        Self::MissingKey {
            key: key.to_string(),
        }
    }

    pub(crate) fn invalid(key: &str, expected: &'static str, found: &serde_json::Value) -> Self {
        Self::InvalidType {
            key: key.to_string(),
            expected,
            found: json_kind(found).to_string(),
        }
    }
}

/// Failure from the trace JSON encoder.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The value exposes none of the export capabilities.
    #[error("object of type {type_name} is not JSON serializable")]
    NotSerializable { type_name: &'static str },

    /// An export capability itself failed. The error is passed through as-is.
    #[error(transparent)]
    Export(anyhow::Error),

    /// Serializer failure unrelated to the fallback chain. Fallback errors
    /// raised under [`encoder::to_string`](crate::trace::encoder::to_string) come
    /// back as their own variant; other serde serializers only see the message.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failure while converting a whole [`Trace`](crate::trace::Trace) to or from JSON.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("failed to encode trace")]
    Encode(#[from] EncodeError),

    #[error("failed to decode trace JSON")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("environment variable {var}={value:?} is not a valid {expected}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
