use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

use crate::core::EntityError;
use crate::entities::dictionary::{
    Dictionary, optional_object, optional_str, required, required_i64, required_object,
    required_str, string_map,
};

/// Who or what produced a piece of feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackSourceType {
    Human,
    AiJudge,
    Code,
}

impl FeedbackSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "HUMAN",
            Self::AiJudge => "AI_JUDGE",
            Self::Code => "CODE",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "HUMAN" => Some(Self::Human),
            "AI_JUDGE" => Some(Self::AiJudge),
            "CODE" => Some(Self::Code),
            _ => None,
        }
    }
}

impl fmt::Display for FeedbackSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackSource {
    pub source_type: FeedbackSourceType,
    /// Identifies the human user or judge model.
    pub source_id: String,
    pub metadata: Option<IndexMap<String, String>>,
}

impl FeedbackSource {
    pub fn new(source_type: FeedbackSourceType, source_id: impl Into<String>) -> Self {
        Self {
            source_type,
            source_id: source_id.into(),
            metadata: None,
        }
    }

    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert(
            "source_type".to_string(),
            Value::from(self.source_type.as_str()),
        );
        dict.insert("source_id".to_string(), Value::from(self.source_id.clone()));
        if let Some(metadata) = self.metadata.as_ref().filter(|m| !m.is_empty()) {
            dict.insert("metadata".to_string(), string_map_value(metadata));
        }
        dict
    }

    pub fn from_dictionary(dict: &Dictionary) -> Result<Self, EntityError> {
        let raw_type = required_str(dict, "source_type")?;
        let source_type = FeedbackSourceType::parse(&raw_type).ok_or_else(|| {
            EntityError::invalid(
                "source_type",
                "one of HUMAN, AI_JUDGE, CODE",
                &Value::from(raw_type.clone()),
            )
        })?;
        let metadata = optional_object(dict, "metadata")?
            .map(|m| string_map("metadata", m))
            .transpose()?;
        Ok(Self {
            source_type,
            source_id: required_str(dict, "source_id")?,
            metadata,
        })
    }
}

/// A feedback value is a boolean verdict, a numeric score, or free text.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FeedbackValue {
    fn to_value(&self) -> Value {
        match self {
            Self::Bool(b) => Value::from(*b),
            Self::Number(n) => Value::from(*n),
            Self::Text(s) => Value::from(s.clone()),
        }
    }

    fn from_value(value: &Value) -> Result<Self, EntityError> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| EntityError::invalid("value", "a finite number", value)),
            Value::String(s) => Ok(Self::Text(s.clone())),
            other => Err(EntityError::invalid(
                "value",
                "a boolean, number or string",
                other,
            )),
        }
    }
}

impl From<bool> for FeedbackValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for FeedbackValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for FeedbackValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FeedbackValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Qualitative or quantitative assessment of one evaluation row.
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub evaluation_id: String,
    pub name: String,
    pub source: FeedbackSource,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub value: FeedbackValue,
    pub rationale: Option<String>,
    pub metadata: Option<IndexMap<String, String>>,
}

impl Feedback {
    pub fn new(
        evaluation_id: impl Into<String>,
        name: impl Into<String>,
        source: FeedbackSource,
        timestamp: i64,
        value: impl Into<FeedbackValue>,
    ) -> Self {
        Self {
            evaluation_id: evaluation_id.into(),
            name: name.into(),
            source,
            timestamp,
            value: value.into(),
            rationale: None,
            metadata: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(IndexMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert(
            "evaluation_id".to_string(),
            Value::from(self.evaluation_id.clone()),
        );
        dict.insert("name".to_string(), Value::from(self.name.clone()));
        dict.insert(
            "source".to_string(),
            Value::Object(self.source.to_dictionary()),
        );
        dict.insert("timestamp".to_string(), Value::from(self.timestamp));
        dict.insert("value".to_string(), self.value.to_value());
        if let Some(rationale) = self.rationale.as_ref().filter(|r| !r.is_empty()) {
            dict.insert("rationale".to_string(), Value::from(rationale.clone()));
        }
        if let Some(metadata) = self.metadata.as_ref().filter(|m| !m.is_empty()) {
            dict.insert("metadata".to_string(), string_map_value(metadata));
        }
        dict
    }

    pub fn from_dictionary(dict: &Dictionary) -> Result<Self, EntityError> {
        let metadata = optional_object(dict, "metadata")?
            .map(|m| string_map("metadata", m))
            .transpose()?;
        Ok(Self {
            evaluation_id: required_str(dict, "evaluation_id")?,
            name: required_str(dict, "name")?,
            source: FeedbackSource::from_dictionary(&required_object(dict, "source")?)?,
            timestamp: required_i64(dict, "timestamp")?,
            value: FeedbackValue::from_value(required(dict, "value")?)?,
            rationale: optional_str(dict, "rationale")?,
            metadata,
        })
    }
}

fn string_map_value(map: &IndexMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect(),
    )
}
