//! Span capture for instrumented function calls.
//!
//! Annotate a function with [`#[trace]`](macro@crate::trace) (or call [`traced`]
//! directly) and every call records a [`Span`] holding its inputs, outputs,
//! status and attributes. A traced call made while another traced call is
//! running becomes its child. When the outermost call returns, the finished
//! [`Trace`] goes to the configured [`TraceClient`].
//!
//! ```
//! use mlflow_entities::trace::{SpanOptions, ToTraceValue, TraceFields, Tracer};
//! use mlflow_entities::TracingSettings;
//!
//! let tracer = Tracer::in_memory(TracingSettings::default());
//! let inputs = TraceFields::from([("x".to_string(), 2.to_trace_value())]);
//! let doubled = tracer.trace(SpanOptions::for_function("double"), inputs, || 2 * 2);
//! assert_eq!(doubled, 4);
//!
//! let trace = tracer.get_traces(1).pop().unwrap();
//! assert_eq!(trace.info.request_metadata["inputs"], r#"{"x": 2}"#);
//! ```
//!
//! The active span is tracked per call stack: each traced future owns a span
//! stack (a tokio task-local) and code outside of one uses a thread-local stack.
//! Spans started on a different thread or task without the context do not nest.

pub mod client;
pub mod context;
pub mod encoder;
pub mod live;
pub mod model;
pub mod span;
pub mod tracer;
pub mod value;

pub use client::*;
pub use context::{active_span, is_tracing};
pub use encoder::{PythonFormatter, TraceJsonEncoder};
pub use live::{Failure, LiveSpan, SpanGuard};
pub use model::*;
pub use span::*;
pub use tracer::*;
pub use value::*;

use std::fmt;
use std::future::Future;

use crate::core::settings::global_tracer;

pub(crate) fn now_ns() -> i64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
}

/// Runs `f` in a span using the process-wide tracer.
pub fn traced<R, F>(options: SpanOptions, inputs: TraceFields, f: F) -> R
where
    F: FnOnce() -> R,
    R: ToTraceValue,
{
    global_tracer().trace(options, inputs, f)
}

pub fn traced_result<T, E, F>(options: SpanOptions, inputs: TraceFields, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    T: ToTraceValue,
    E: fmt::Display,
{
    global_tracer().trace_result(options, inputs, f)
}

pub async fn traced_async<F>(options: SpanOptions, inputs: TraceFields, fut: F) -> F::Output
where
    F: Future,
    F::Output: ToTraceValue,
{
    let tracer = global_tracer();
    tracer.trace_async(options, inputs, fut).await
}

pub async fn traced_async_result<F, T, E>(
    options: SpanOptions,
    inputs: TraceFields,
    fut: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    T: ToTraceValue,
    E: fmt::Display,
{
    let tracer = global_tracer();
    tracer.trace_async_result(options, inputs, fut).await
}

/// Starts a manual span on the process-wide tracer, active until the guard drops.
pub fn start_span(options: SpanOptions) -> SpanGuard {
    global_tracer().start_span(options)
}

/// Runs the future built by `f` inside a manual span on the process-wide tracer.
pub async fn in_span<F, Fut>(options: SpanOptions, f: F) -> Fut::Output
where
    F: FnOnce(LiveSpan) -> Fut,
    Fut: Future,
{
    global_tracer().in_span(options, f).await
}

/// Adds tags to the trace of the active span. Returns `false` when no span is active.
pub fn update_current_trace_tags<K, V>(tags: impl IntoIterator<Item = (K, V)>) -> bool
where
    K: Into<String>,
    V: Into<String>,
{
    let Some(span) = active_span() else {
        tracing::debug!("no active span; trace tags ignored");
        return false;
    };
    for (key, value) in tags {
        span.set_trace_tag(key, value);
    }
    true
}

/// The newest `max_results` traces recorded by the process-wide tracer.
pub fn get_traces(max_results: usize) -> Vec<Trace> {
    global_tracer().get_traces(max_results)
}
