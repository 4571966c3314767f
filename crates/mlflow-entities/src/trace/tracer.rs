use bon::Builder;
use futures::FutureExt;
use indexmap::IndexMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::core::settings::TracingSettings;
use crate::trace::client::{InMemoryTraceClient, TraceClient};
use crate::trace::context::{self, active_span};
use crate::trace::live::{Failure, LiveSpan, SpanGuard, TraceBuffer};
use crate::trace::span::SpanType;
use crate::trace::value::{ToTraceValue, TraceValue};

/// Ordered name → value map used for span inputs and attributes.
pub type TraceFields = IndexMap<String, TraceValue>;

/// Static configuration of a span, fixed where the traced function is declared.
#[derive(Debug, Clone, Builder)]
pub struct SpanOptions {
    #[builder(into)]
    pub name: String,
    #[builder(into, default)]
    pub span_type: SpanType,
    #[builder(default)]
    pub attributes: TraceFields,
    /// Recorded as the `function_name` attribute when set.
    #[builder(into)]
    pub function_name: Option<String>,
}

impl SpanOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            span_type: SpanType::default(),
            attributes: TraceFields::new(),
            function_name: None,
        }
    }

    /// Options for a span wrapping the function `function_name`; the span is
    /// named after the function unless renamed with [`with_name`](Self::with_name).
    pub fn for_function(function_name: &str) -> Self {
        Self {
            function_name: Some(function_name.to_string()),
            ..Self::new(function_name)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_span_type(mut self, span_type: impl Into<SpanType>) -> Self {
        self.span_type = span_type.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl ToTraceValue) -> Self {
        self.attributes.insert(key.into(), value.to_trace_value());
        self
    }

    pub fn with_attributes<K, V>(mut self, attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToTraceValue,
    {
        for (key, value) in attributes {
            self.attributes.insert(key.into(), value.to_trace_value());
        }
        self
    }
}

/// Starts spans and hands finished traces to a [`TraceClient`].
///
/// Only root spans use the tracer's client and experiment; a span started
/// while another is active joins that span's trace.
#[derive(Clone)]
pub struct Tracer {
    settings: TracingSettings,
    client: Arc<dyn TraceClient>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::in_memory(TracingSettings::default())
    }
}

impl Tracer {
    pub fn new(settings: TracingSettings, client: Arc<dyn TraceClient>) -> Self {
        Self { settings, client }
    }

    /// A tracer buffering up to `settings.max_buffered_traces` traces in memory.
    pub fn in_memory(settings: TracingSettings) -> Self {
        let client = Arc::new(InMemoryTraceClient::new(settings.max_buffered_traces));
        Self::new(settings, client)
    }

    pub fn settings(&self) -> &TracingSettings {
        &self.settings
    }

    pub fn client(&self) -> &Arc<dyn TraceClient> {
        &self.client
    }

    pub fn with_client(mut self, client: Arc<dyn TraceClient>) -> Self {
        self.client = client;
        self
    }

    pub fn get_traces(&self, max_results: usize) -> Vec<crate::trace::Trace> {
        self.client.get_traces(max_results)
    }

    /// Starts a span without making it active. The caller must call
    /// [`LiveSpan::end`].
    pub fn start_detached_span(&self, options: SpanOptions) -> LiveSpan {
        let SpanOptions {
            name,
            span_type,
            mut attributes,
            function_name,
        } = options;
        if let Some(function_name) = function_name {
            attributes.insert(
                "function_name".to_string(),
                TraceValue::String(function_name),
            );
        }
        let parent = active_span();
        LiveSpan::start(name, span_type, attributes, parent.as_ref(), || {
            TraceBuffer::new(self.settings.experiment_id.clone(), self.client.clone())
        })
    }

    /// Starts a span and makes it active on this call stack until the guard drops.
    ///
    /// Manual spans are recorded even when function tracing is disabled. Outside
    /// a traced future the guard is tracked per thread, so in plain async code
    /// prefer [`in_span`](Self::in_span) over holding it across an `.await`.
    #[tracing::instrument(
        name = "mlflow.trace.start_span",
        level = "debug",
        skip_all,
        fields(span_name = %options.name)
    )]
    pub fn start_span(&self, options: SpanOptions) -> SpanGuard {
        SpanGuard::enter(self.start_detached_span(options))
    }

    /// Runs the future built by `f` inside a manual span that is active only
    /// while that future is polled. The span is handed to `f` for recording
    /// outputs or attributes and ends when the future completes.
    #[tracing::instrument(
        name = "mlflow.trace.in_span",
        level = "debug",
        skip_all,
        fields(span_name = %options.name)
    )]
    pub async fn in_span<F, Fut>(&self, options: SpanOptions, f: F) -> Fut::Output
    where
        F: FnOnce(LiveSpan) -> Fut,
        Fut: Future,
    {
        let span = self.start_detached_span(options);
        let output = poll_in_span(&span, f(span.clone())).await;
        span.end();
        output
    }

    /// Runs `f` inside a span whose outputs are its return value.
    pub fn trace<R, F>(&self, options: SpanOptions, inputs: TraceFields, f: F) -> R
    where
        F: FnOnce() -> R,
        R: ToTraceValue,
    {
        self.run_sync(options, inputs, f, |out| Ok(out.to_trace_value()))
    }

    /// Like [`trace`](Self::trace), but an `Err` return ends the span with an
    /// error status carrying the error's message.
    pub fn trace_result<T, E, F>(
        &self,
        options: SpanOptions,
        inputs: TraceFields,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        T: ToTraceValue,
        E: fmt::Display,
    {
        self.run_sync(options, inputs, f, result_outcome)
    }

    #[tracing::instrument(
        name = "mlflow.trace.scope",
        level = "debug",
        skip_all,
        fields(span_name = %options.name)
    )]
    pub async fn trace_async<F>(&self, options: SpanOptions, inputs: TraceFields, fut: F) -> F::Output
    where
        F: Future,
        F::Output: ToTraceValue,
    {
        self.run_async(options, inputs, fut, |out| Ok(out.to_trace_value()))
            .await
    }

    #[tracing::instrument(
        name = "mlflow.trace.scope",
        level = "debug",
        skip_all,
        fields(span_name = %options.name)
    )]
    pub async fn trace_async_result<F, T, E>(
        &self,
        options: SpanOptions,
        inputs: TraceFields,
        fut: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        T: ToTraceValue,
        E: fmt::Display,
    {
        self.run_async(options, inputs, fut, result_outcome).await
    }

    fn run_sync<R>(
        &self,
        options: SpanOptions,
        inputs: TraceFields,
        f: impl FnOnce() -> R,
        outcome: impl FnOnce(&R) -> Result<TraceValue, Failure>,
    ) -> R {
        if !self.settings.enabled {
            return f();
        }
        let span = self.start_detached_span(options);
        span.set_inputs(TraceValue::Object(inputs));
        let entered = context::enter(&span);
        let result = panic::catch_unwind(AssertUnwindSafe(f));
        drop(entered);
        match result {
            Ok(value) => {
                span.finish(outcome(&value));
                value
            }
            Err(payload) => {
                span.finish(Err(Failure::from_panic(payload.as_ref())));
                panic::resume_unwind(payload)
            }
        }
    }

    async fn run_async<F: Future>(
        &self,
        options: SpanOptions,
        inputs: TraceFields,
        fut: F,
        outcome: impl FnOnce(&F::Output) -> Result<TraceValue, Failure>,
    ) -> F::Output {
        if !self.settings.enabled {
            return fut.await;
        }
        let span = self.start_detached_span(options);
        span.set_inputs(TraceValue::Object(inputs));
        let value = poll_in_span(&span, fut).await;
        span.finish(outcome(&value));
        value
    }
}

/// Polls `fut` with `span` active. A panic ends the span failed and is resumed.
async fn poll_in_span<F: Future>(span: &LiveSpan, fut: F) -> F::Output {
    match context::scope(span.clone(), AssertUnwindSafe(fut).catch_unwind()).await {
        Ok(value) => value,
        Err(payload) => {
            span.finish(Err(Failure::from_panic(payload.as_ref())));
            panic::resume_unwind(payload)
        }
    }
}

fn result_outcome<T: ToTraceValue, E: fmt::Display>(
    result: &Result<T, E>,
) -> Result<TraceValue, Failure> {
    match result {
        Ok(value) => Ok(value.to_trace_value()),
        Err(error) => Err(Failure::from_error(error)),
    }
}
