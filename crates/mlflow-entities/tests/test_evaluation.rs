use mlflow_entities::{
    Dictionary, EntityError, Evaluation, Feedback, FeedbackSource, FeedbackSourceType,
    FeedbackValue, Metric,
};
use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

fn object(value: Value) -> Dictionary {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

#[fixture]
fn minimal() -> Evaluation {
    Evaluation::builder()
        .evaluation_id("eval-1")
        .run_id("run-1")
        .inputs_id("inputs-1")
        .inputs(object(json!({"question": "What is 2+2?"})))
        .outputs(object(json!({"answer": "4"})))
        .build()
}

#[fixture]
fn complete() -> Evaluation {
    let source = FeedbackSource::new(FeedbackSourceType::AiJudge, "gpt-judge");
    Evaluation::builder()
        .evaluation_id("eval-2")
        .run_id("run-2")
        .inputs_id("inputs-2")
        .inputs(object(json!({"question": "Capital of France?", "context": ["geo"]})))
        .outputs(object(json!({"answer": "Paris", "confidence": 0.9})))
        .request_id("7f3e0c")
        .ground_truths(object(json!({"answer": "Paris"})))
        .feedback(vec![
            Feedback::new("eval-2", "correct", source.clone(), 1_700_000_000_000, true)
                .with_rationale("matches the ground truth"),
            Feedback::new("eval-2", "tone", source, 1_700_000_000_001, "neutral")
                .with_metadata("rubric", "v2"),
        ])
        .metrics(vec![
            Metric::new("latency_ms", 120.5, 1_700_000_000_002, 0),
            Metric::new("tokens", 42.0, 1_700_000_000_003, 1),
        ])
        .build()
}

#[rstest]
fn minimal_evaluation_writes_only_mandatory_keys(minimal: Evaluation) {
    let dict = minimal.to_dictionary();
    assert_eq!(
        Value::Object(dict),
        json!({
            "evaluation_id": "eval-1",
            "run_id": "run-1",
            "inputs_id": "inputs-1",
            "inputs": {"question": "What is 2+2?"},
            "outputs": {"answer": "4"},
        })
    );
}

#[rstest]
fn complete_evaluation_round_trips(complete: Evaluation) {
    let dict = complete.to_dictionary();
    let keys: Vec<&str> = dict.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        [
            "evaluation_id",
            "run_id",
            "inputs_id",
            "inputs",
            "outputs",
            "request_id",
            "ground_truths",
            "feedback",
            "metrics",
        ]
    );
    assert_eq!(Evaluation::from_dictionary(&dict).unwrap(), complete);
}

#[rstest]
fn nested_entries_use_their_own_codecs(complete: Evaluation) {
    let dict = complete.to_dictionary();
    assert_eq!(
        dict["metrics"][0],
        json!({"key": "latency_ms", "value": 120.5, "timestamp": 1_700_000_000_002_i64, "step": 0})
    );
    assert_eq!(dict["feedback"][0]["source"]["source_type"], json!("AI_JUDGE"));
    assert_eq!(dict["feedback"][0]["value"], json!(true));
    assert_eq!(dict["feedback"][1]["metadata"], json!({"rubric": "v2"}));
}

#[rstest]
fn json_string_round_trip(complete: Evaluation) {
    let json = complete.to_json();
    assert_eq!(Evaluation::from_json(&json).unwrap(), complete);
}

#[rstest]
#[case("evaluation_id")]
#[case("run_id")]
#[case("inputs_id")]
#[case("inputs")]
#[case("outputs")]
fn missing_mandatory_key_is_reported(minimal: Evaluation, #[case] key: &str) {
    let mut dict = minimal.to_dictionary();
    dict.remove(key);

    match Evaluation::from_dictionary(&dict) {
        Err(EntityError::MissingKey { key: missing }) => assert_eq!(missing, key),
        other => panic!("expected MissingKey for {key}, got {other:?}"),
    }
}

#[rstest]
fn absent_optional_keys_decode_as_none(minimal: Evaluation) {
    let decoded = Evaluation::from_dictionary(&minimal.to_dictionary()).unwrap();
    assert_eq!(decoded.request_id, None);
    assert_eq!(decoded.ground_truths, None);
    assert_eq!(decoded.feedback, None);
    assert_eq!(decoded.metrics, None);
}

#[rstest]
fn empty_optional_values_are_indistinguishable_from_none(minimal: Evaluation) {
    let evaluation = Evaluation {
        request_id: Some(String::new()),
        ground_truths: Some(Dictionary::new()),
        feedback: Some(Vec::new()),
        metrics: Some(Vec::new()),
        ..minimal.clone()
    };

    let dict = evaluation.to_dictionary();
    assert_eq!(dict.len(), 5);
    assert_eq!(Evaluation::from_dictionary(&dict).unwrap(), minimal);
}

#[rstest]
fn wrong_json_type_is_reported(minimal: Evaluation) {
    let mut dict = minimal.to_dictionary();
    dict.insert("inputs".to_string(), json!(["not", "a", "mapping"]));

    let err = Evaluation::from_dictionary(&dict).unwrap_err();
    assert!(matches!(err, EntityError::InvalidType { ref key, .. } if key == "inputs"));
}

#[test]
fn feedback_values_keep_their_kind() {
    let source = FeedbackSource::new(FeedbackSourceType::Human, "reviewer@example.com");
    for value in [
        FeedbackValue::Bool(false),
        FeedbackValue::Number(0.75),
        FeedbackValue::Text("needs work".to_string()),
    ] {
        let feedback = Feedback::new("eval-3", "quality", source.clone(), 1, value.clone());
        let decoded = Feedback::from_dictionary(&feedback.to_dictionary()).unwrap();
        assert_eq!(decoded.value, value);
    }
}

#[test]
fn from_json_rejects_non_objects() {
    assert!(matches!(
        Evaluation::from_json("[1, 2, 3]"),
        Err(EntityError::Json(_) | EntityError::InvalidType { .. })
    ));
}
