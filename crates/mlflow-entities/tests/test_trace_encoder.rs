use indexmap::IndexMap;
use mlflow_entities::trace::{SpanOptions, TraceFields, encoder};
use mlflow_entities::{
    EncodeError, ToTraceValue, TraceError, TraceExport, TraceValue, Tracer, TracingSettings,
    attributes,
};
use rstest::rstest;
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Serialize)]
struct MyModel {
    x: i64,
    y: String,
}

impl TraceExport for MyModel {
    fn model_dump(&self) -> Option<anyhow::Result<Value>> {
        Some(serde_json::to_value(self).map_err(Into::into))
    }

    fn display_string(&self) -> Option<String> {
        Some("MyModel(...)".to_string())
    }
}

/// Message-like object that only exposes its raw fields, some of which are
/// themselves foreign values.
#[derive(Debug)]
struct ChatMessage {
    content: Vec<IndexMap<String, String>>,
    message_type: String,
    sent_at: chrono::NaiveDateTime,
    annotations: Vec<Tag>,
}

#[derive(Debug, Clone)]
struct Tag(&'static str);

impl TraceExport for Tag {
    fn display_string(&self) -> Option<String> {
        Some(format!("#{}", self.0))
    }
}

impl TraceExport for ChatMessage {
    fn raw_fields(&self) -> Option<anyhow::Result<IndexMap<String, TraceValue>>> {
        let mut fields = IndexMap::new();
        fields.insert("content".to_string(), self.content.to_trace_value());
        fields.insert("type".to_string(), self.message_type.to_trace_value());
        fields.insert("sent_at".to_string(), self.sent_at.to_trace_value());
        fields.insert(
            "annotations".to_string(),
            TraceValue::Array(
                self.annotations
                    .iter()
                    .cloned()
                    .map(TraceValue::foreign)
                    .collect(),
            ),
        );
        fields.insert("additional_kwargs".to_string(), TraceValue::Object(IndexMap::new()));
        Some(Ok(fields))
    }
}

#[derive(Debug)]
struct Opaque;

impl TraceExport for Opaque {}

#[derive(Debug)]
struct BrokenExport;

impl TraceExport for BrokenExport {
    fn model_dump(&self) -> Option<anyhow::Result<Value>> {
        Some(Err(anyhow::anyhow!("validation failed for field `x`")))
    }
}

fn turn(role: &str, content: &str) -> IndexMap<String, String> {
    IndexMap::from([
        ("role".to_string(), role.to_string()),
        ("content".to_string(), content.to_string()),
    ])
}

#[test]
fn model_dump_is_used_verbatim() {
    let value = TraceValue::foreign(MyModel {
        x: 1,
        y: "foo".to_string(),
    });

    let json = encoder::to_string(&value).unwrap();
    assert_eq!(json, r#"{"x": 1, "y": "foo"}"#);
    assert_eq!(
        serde_json::from_str::<Value>(&json).unwrap(),
        json!({"x": 1, "y": "foo"})
    );
}

#[test]
fn raw_fields_are_resolved_recursively() {
    let message = ChatMessage {
        content: vec![turn("system", "Hello, World!"), turn("user", "Hi!")],
        message_type: "chat".to_string(),
        sent_at: chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap(),
        annotations: vec![Tag("greeting")],
    };

    let json = encoder::to_string(&TraceValue::foreign(message)).unwrap();
    let loaded: Value = serde_json::from_str(&json).unwrap();
    let loaded = loaded.as_object().unwrap();

    let expected_subset = json!({
        "content": [
            {"role": "system", "content": "Hello, World!"},
            {"role": "user", "content": "Hi!"},
        ],
        "type": "chat",
        "sent_at": "2024-01-02 03:04:05",
        "annotations": ["#greeting"],
    });
    for (key, value) in expected_subset.as_object().unwrap() {
        assert_eq!(loaded.get(key), Some(value), "field `{key}`");
    }
}

#[test]
fn object_without_capabilities_is_not_serializable() {
    let err = encoder::to_string(&TraceValue::foreign(Opaque)).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Opaque"), "{message}");
    assert!(message.ends_with("is not JSON serializable"), "{message}");
    assert!(matches!(err, EncodeError::NotSerializable { .. }));
}

#[test]
fn to_string_returns_export_errors_as_is() {
    let value = attributes! { "ok" => 1, "broken" => TraceValue::foreign(BrokenExport) };
    let err = encoder::to_string(&TraceValue::Object(value)).unwrap_err();
    match err {
        EncodeError::Export(inner) => {
            assert_eq!(inner.to_string(), "validation failed for field `x`")
        }
        other => panic!("expected an export error, got {other:?}"),
    }
}

#[test]
fn trace_json_surfaces_fallback_errors() {
    let tracer = Tracer::in_memory(TracingSettings::default());
    let options = SpanOptions::new("connect").with_attribute("handle", TraceValue::foreign(Opaque));
    tracer.trace(options, TraceFields::new(), || ());

    let trace = tracer.get_traces(1).pop().unwrap();
    let err = trace.to_json().unwrap_err();
    assert!(matches!(
        err,
        TraceError::Encode(EncodeError::NotSerializable { type_name }) if type_name.ends_with("Opaque")
    ));
}

#[test]
fn encoder_reports_the_unserializable_type() {
    let err = TraceValue::foreign(Opaque).to_json_value().unwrap_err();
    assert!(matches!(err, EncodeError::NotSerializable { type_name } if type_name.ends_with("Opaque")));
}

#[test]
fn export_errors_propagate_unchanged() {
    let err = TraceValue::foreign(BrokenExport).to_json_value().unwrap_err();
    assert_eq!(err.to_string(), "validation failed for field `x`");
    assert!(matches!(err, EncodeError::Export(_)));
}

#[rstest]
#[case(json!(null), "null")]
#[case(json!([1, 2.5, "three"]), r#"[1, 2.5, "three"]"#)]
#[case(json!({"a": {"b": []}}), r#"{"a": {"b": []}}"#)]
#[case(json!("naïve"), r#""na\u00efve""#)]
fn native_values_use_python_layout(#[case] value: Value, #[case] expected: &str) {
    assert_eq!(encoder::to_string(&value.to_trace_value()).unwrap(), expected);
}

#[test]
fn foreign_values_nest_inside_native_ones() {
    let fields = attributes! {
        "model" => TraceValue::foreign(MyModel { x: 2, y: "bar".to_string() }),
        "when" => chrono::NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_micro_opt(23, 59, 59, 1)
            .unwrap(),
    };

    let encoded = TraceValue::Object(fields).to_json_value().unwrap();
    assert_eq!(
        encoded,
        json!({
            "model": {"x": 2, "y": "bar"},
            "when": "2023-12-31 23:59:59.000001",
        })
    );
}
