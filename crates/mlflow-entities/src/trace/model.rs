use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::TraceError;
use crate::trace::encoder;
use crate::trace::span::{Span, SpanStatusCode};

/// Keys of [`TraceInfo::request_metadata`].
pub mod metadata_key {
    pub const NAME: &str = "name";
    pub const INPUTS: &str = "inputs";
    pub const OUTPUTS: &str = "outputs";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceStatus {
    #[default]
    Unspecified,
    Ok,
    Error,
    InProgress,
}

impl From<SpanStatusCode> for TraceStatus {
    fn from(code: SpanStatusCode) -> Self {
        match code {
            SpanStatusCode::Ok => Self::Ok,
            SpanStatusCode::Error => Self::Error,
            SpanStatusCode::Unset => Self::Unspecified,
        }
    }
}

/// Trace-level metadata, filled in when the outermost span ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceInfo {
    pub request_id: String,
    pub experiment_id: String,
    pub timestamp_ms: i64,
    pub execution_time_ms: i64,
    pub status: TraceStatus,
    /// Root span name plus its inputs and outputs as JSON strings.
    pub request_metadata: IndexMap<String, String>,
    #[serde(default)]
    pub tags: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TraceData {
    /// In start order: a parent always precedes its children.
    pub spans: Vec<Span>,
}

impl TraceData {
    pub fn root_span(&self) -> Option<&Span> {
        self.spans.iter().find(|span| span.is_root())
    }

    pub fn children<'a>(&'a self, span_id: &'a str) -> impl Iterator<Item = &'a Span> + 'a {
        self.spans
            .iter()
            .filter(move |span| span.parent_span_id.as_deref() == Some(span_id))
    }
}

/// One top-level traced call: its metadata and every span it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(rename = "trace_info")]
    pub info: TraceInfo,
    #[serde(rename = "trace_data")]
    pub data: TraceData,
}

impl Trace {
    pub fn request_id(&self) -> &str {
        &self.info.request_id
    }

    pub fn get_span(&self, span_id: &str) -> Option<&Span> {
        self.data.spans.iter().find(|span| span.span_id() == span_id)
    }

    /// Serializes the trace, resolving non-JSON attribute and input values
    /// through the fallback encoder.
    pub fn to_json(&self) -> Result<String, TraceError> {
        Ok(encoder::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, TraceError> {
        serde_json::from_str(json).map_err(TraceError::Decode)
    }
}
