//! These tests share the process-wide tracer, so each one looks its trace up by
//! root span name instead of assuming it is the newest.

use mlflow_entities::trace::{self as tracing_api, SpanStatusCode, SpanType, Trace};
use mlflow_entities::{ToTraceValue, attributes, trace};
use serde_json::json;

fn trace_named(name: &str) -> Trace {
    tracing_api::get_traces(usize::MAX)
        .into_iter()
        .rev()
        .find(|t| t.info.request_metadata["name"] == name)
        .unwrap_or_else(|| panic!("no trace with root span `{name}`"))
}

#[trace(skip(secret))]
fn login(user: &str, secret: &str) -> bool {
    !user.is_empty() && secret.len() > 3
}

#[test]
fn skipped_arguments_are_not_captured() {
    assert!(login("ada", "hunter2"));

    let span = &trace_named("login").data.spans[0];
    assert_eq!(
        span.inputs.as_ref().unwrap().to_json_value().unwrap(),
        json!({"user": "ada"})
    );
    assert_eq!(span.attributes["function_name"].as_str(), Some("login"));
}

#[trace(name = "parse_number", span_type = "PARSER")]
fn parse(raw: &str) -> Result<i64, std::num::ParseIntError> {
    let value: i64 = raw.trim().parse()?;
    Ok(value * 2)
}

#[test]
fn result_functions_record_errors() {
    assert_eq!(parse(" 21 "), Ok(42));
    assert!(parse("not a number").is_err());

    let traces: Vec<Trace> = tracing_api::get_traces(usize::MAX)
        .into_iter()
        .filter(|t| t.info.request_metadata["name"] == "parse_number")
        .collect();
    assert_eq!(traces.len(), 2);

    let ok = &traces[0].data.spans[0];
    assert_eq!(ok.span_type, SpanType::Parser);
    assert_eq!(ok.outputs, Some(42_i64.to_trace_value()));

    let failed = &traces[1].data.spans[0];
    assert_eq!(failed.status.status_code, SpanStatusCode::Error);
    assert_eq!(failed.status.description, "invalid digit found in string");
    assert_eq!(failed.events[0].name, "exception");
}

#[trace]
fn classify(score: f64) -> &'static str {
    if score < 0.5 {
        return "low";
    }
    "high"
}

#[trace]
fn classify_all(scores: Vec<f64>) -> Vec<&'static str> {
    scores.into_iter().map(classify).collect()
}

#[test]
fn early_returns_and_nesting() {
    assert_eq!(classify_all(vec![0.1, 0.9]), ["low", "high"]);

    let trace = trace_named("classify_all");
    let spans = &trace.data.spans;
    assert_eq!(spans.len(), 3);
    assert_eq!(trace.info.request_metadata["inputs"], r#"{"scores": [0.1, 0.9]}"#);
    assert_eq!(trace.info.request_metadata["outputs"], r#"["low", "high"]"#);
    assert!(spans[1..]
        .iter()
        .all(|s| s.parent_span_id.as_deref() == Some(spans[0].span_id())));
}

struct Retriever {
    index: String,
}

impl Retriever {
    #[trace(span_type = SpanType::Retriever, attributes = attributes! { "index" => self.index.clone() })]
    fn search(&self, query: &str, r#type: &str) -> Vec<String> {
        vec![format!("{}:{}:{}", self.index, query, r#type)]
    }

    #[trace]
    fn labelled(&self, n: u32) -> impl ToTraceValue {
        format!("#{n}")
    }
}

#[test]
fn methods_capture_arguments_but_not_self() {
    let retriever = Retriever {
        index: "docs".to_string(),
    };
    assert_eq!(retriever.search("rust", "bm25"), ["docs:rust:bm25"]);
    retriever.labelled(7);

    let span = &trace_named("search").data.spans[0];
    assert_eq!(span.span_type, SpanType::Retriever);
    assert_eq!(
        span.inputs.as_ref().unwrap().to_json_value().unwrap(),
        json!({"query": "rust", "type": "bm25"})
    );
    assert_eq!(span.attributes["index"].as_str(), Some("docs"));

    let labelled = &trace_named("labelled").data.spans[0];
    assert_eq!(labelled.outputs.as_ref().unwrap().as_str(), Some("#7"));
}

#[trace(span_type = SpanType::Tool)]
async fn fetch_page(page: u32) -> String {
    tokio::task::yield_now().await;
    format!("page-{page}")
}

#[trace(name = "crawl")]
async fn crawl(pages: u32) -> usize {
    let mut total = 0;
    for page in 1..=pages {
        total += fetch_page(page).await.len();
    }
    total
}

#[tokio::test]
async fn async_functions_nest_under_their_caller() {
    assert_eq!(crawl(2).await, 12);

    let trace = trace_named("crawl");
    let names: Vec<&str> = trace.data.spans.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["crawl", "fetch_page", "fetch_page"]);
    assert_eq!(trace.data.spans[1].span_type, SpanType::Tool);
    assert_eq!(
        trace.data.spans[2].inputs.as_ref().unwrap().to_json_value().unwrap(),
        json!({"page": 2})
    );
}

#[trace]
async fn load_config(path: String) -> anyhow::Result<u16> {
    if path.is_empty() {
        anyhow::bail!("empty path");
    }
    Ok(8080)
}

#[tokio::test]
async fn async_result_functions_record_errors() {
    assert_eq!(load_config("app.toml".to_string()).await.unwrap(), 8080);
    let err = load_config(String::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "empty path");

    let failed = tracing_api::get_traces(usize::MAX)
        .into_iter()
        .filter(|t| t.info.request_metadata["name"] == "load_config")
        .find(|t| t.info.request_metadata["inputs"] == r#"{"path": ""}"#)
        .expect("failed call recorded");
    assert_eq!(failed.data.spans[0].status.status_code, SpanStatusCode::Error);
    assert_eq!(failed.data.spans[0].status.description, "empty path");
}
