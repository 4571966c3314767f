use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::core::EncodeError;
use crate::entities::Dictionary;
use crate::trace::value::{ToTraceValue, TraceValue};

/// Classification of the work a span represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SpanType {
    Llm,
    Chain,
    Agent,
    Tool,
    ChatModel,
    Retriever,
    Parser,
    Embedding,
    Reranker,
    #[default]
    Unknown,
    /// Any other category name, kept verbatim.
    Custom(String),
}

impl SpanType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Llm => "LLM",
            Self::Chain => "CHAIN",
            Self::Agent => "AGENT",
            Self::Tool => "TOOL",
            Self::ChatModel => "CHAT_MODEL",
            Self::Retriever => "RETRIEVER",
            Self::Parser => "PARSER",
            Self::Embedding => "EMBEDDING",
            Self::Reranker => "RERANKER",
            Self::Unknown => "UNKNOWN",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for SpanType {
    fn from(value: &str) -> Self {
        match value {
            "LLM" => Self::Llm,
            "CHAIN" => Self::Chain,
            "AGENT" => Self::Agent,
            "TOOL" => Self::Tool,
            "CHAT_MODEL" => Self::ChatModel,
            "RETRIEVER" => Self::Retriever,
            "PARSER" => Self::Parser,
            "EMBEDDING" => Self::Embedding,
            "RERANKER" => Self::Reranker,
            "UNKNOWN" => Self::Unknown,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for SpanType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for SpanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SpanType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SpanType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatusCode {
    #[default]
    Unset,
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpanStatus {
    pub status_code: SpanStatusCode,
    pub description: String,
}

impl SpanStatus {
    pub fn ok() -> Self {
        Self {
            status_code: SpanStatusCode::Ok,
            description: String::new(),
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            status_code: SpanStatusCode::Error,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    pub request_id: String,
    pub span_id: String,
}

/// A point-in-time occurrence inside a span, e.g. a raised error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub attributes: IndexMap<String, TraceValue>,
}

impl SpanEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: super::now_ns(),
            attributes: IndexMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl ToTraceValue) -> Self {
        self.attributes.insert(key.into(), value.to_trace_value());
        self
    }
}

/// A finished, timed unit of work within a trace.
///
/// Times are nanoseconds since the Unix epoch. `parent_span_id` is a plain id
/// reference: the tree is rebuilt from ids, spans never own each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub name: String,
    pub context: SpanContext,
    pub span_type: SpanType,
    pub parent_span_id: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub status: SpanStatus,
    pub inputs: Option<TraceValue>,
    pub outputs: Option<TraceValue>,
    #[serde(default)]
    pub attributes: IndexMap<String, TraceValue>,
    #[serde(default)]
    pub events: Vec<SpanEvent>,
}

impl Span {
    pub fn request_id(&self) -> &str {
        &self.context.request_id
    }

    pub fn span_id(&self) -> &str {
        &self.context.span_id
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    pub fn duration_ns(&self) -> i64 {
        self.end_time - self.start_time
    }

    pub fn to_dictionary(&self) -> Result<Dictionary, EncodeError> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(EncodeError::Json(serde::ser::Error::custom(format!(
                "span serialized to {} instead of an object",
                crate::core::json_kind(&other)
            )))),
        }
    }

    pub fn from_dictionary(dict: &Dictionary) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(dict.clone()))
    }
}
