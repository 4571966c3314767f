use bon::Builder;
use serde_json::Value;
use tracing::trace;

use crate::core::EntityError;
use crate::entities::dictionary::{
    Dictionary, optional_list, optional_object, optional_str, parse_object, required_object,
    required_str,
};
use crate::entities::{Feedback, Metric};

/// One evaluation outcome recorded against a run.
///
/// The dictionary codec drops optional fields that are empty: an empty
/// `feedback` list or an empty `request_id` is written as nothing and read back
/// as `None`.
///
/// ```
/// use mlflow_entities::Evaluation;
/// use serde_json::{Map, json};
///
/// let inputs: Map<_, _> = json!({"question": "2+2?"}).as_object().unwrap().clone();
/// let outputs: Map<_, _> = json!({"answer": "4"}).as_object().unwrap().clone();
/// let evaluation = Evaluation::builder()
///     .evaluation_id("eval-1")
///     .run_id("run-1")
///     .inputs_id("inputs-1")
///     .inputs(inputs)
///     .outputs(outputs)
///     .build();
///
/// let dict = evaluation.to_dictionary();
/// assert_eq!(Evaluation::from_dictionary(&dict).unwrap(), evaluation);
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct Evaluation {
    #[builder(into)]
    pub evaluation_id: String,
    /// The run that owns this evaluation.
    #[builder(into)]
    pub run_id: String,
    /// Identifies the input names and values that were evaluated.
    #[builder(into)]
    pub inputs_id: String,
    pub inputs: Dictionary,
    pub outputs: Dictionary,
    /// Request id of the trace produced while computing `outputs`.
    #[builder(into)]
    pub request_id: Option<String>,
    pub ground_truths: Option<Dictionary>,
    pub feedback: Option<Vec<Feedback>>,
    pub metrics: Option<Vec<Metric>>,
}

impl Evaluation {
    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert(
            "evaluation_id".to_string(),
            Value::from(self.evaluation_id.clone()),
        );
        dict.insert("run_id".to_string(), Value::from(self.run_id.clone()));
        dict.insert("inputs_id".to_string(), Value::from(self.inputs_id.clone()));
        dict.insert("inputs".to_string(), Value::Object(self.inputs.clone()));
        dict.insert("outputs".to_string(), Value::Object(self.outputs.clone()));

        if let Some(request_id) = self.request_id.as_ref().filter(|id| !id.is_empty()) {
            dict.insert("request_id".to_string(), Value::from(request_id.clone()));
        }
        if let Some(ground_truths) = self.ground_truths.as_ref().filter(|g| !g.is_empty()) {
            dict.insert(
                "ground_truths".to_string(),
                Value::Object(ground_truths.clone()),
            );
        }
        if let Some(feedback) = self.feedback.as_ref().filter(|f| !f.is_empty()) {
            dict.insert(
                "feedback".to_string(),
                Value::Array(
                    feedback
                        .iter()
                        .map(|fb| Value::Object(fb.to_dictionary()))
                        .collect(),
                ),
            );
        }
        if let Some(metrics) = self.metrics.as_ref().filter(|m| !m.is_empty()) {
            dict.insert(
                "metrics".to_string(),
                Value::Array(
                    metrics
                        .iter()
                        .map(|metric| Value::Object(metric.to_dictionary()))
                        .collect(),
                ),
            );
        }
        dict
    }

    pub fn from_dictionary(dict: &Dictionary) -> Result<Self, EntityError> {
        let evaluation = Self {
            evaluation_id: required_str(dict, "evaluation_id")?,
            run_id: required_str(dict, "run_id")?,
            inputs_id: required_str(dict, "inputs_id")?,
            inputs: required_object(dict, "inputs")?,
            outputs: required_object(dict, "outputs")?,
            request_id: optional_str(dict, "request_id")?,
            ground_truths: optional_object(dict, "ground_truths")?,
            feedback: optional_list(dict, "feedback", Feedback::from_dictionary)?,
            metrics: optional_list(dict, "metrics", Metric::from_dictionary)?,
        };
        trace!(
            evaluation_id = %evaluation.evaluation_id,
            feedback = evaluation.feedback.as_ref().map_or(0, Vec::len),
            metrics = evaluation.metrics.as_ref().map_or(0, Vec::len),
            "evaluation decoded"
        );
        Ok(evaluation)
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.to_dictionary()).to_string()
    }

    pub fn from_json(json: &str) -> Result<Self, EntityError> {
        Self::from_dictionary(&parse_object(json)?)
    }
}
