use indexmap::IndexMap;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::panic;
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError};
use tracing::{debug, trace, warn};

use crate::trace::client::TraceClient;
use crate::trace::context::{self, StackEntry};
use crate::trace::encoder::{self, TraceJsonEncoder};
use crate::trace::model::{Trace, TraceData, TraceInfo, TraceStatus, metadata_key};
use crate::trace::span::{Span, SpanContext, SpanEvent, SpanStatus, SpanStatusCode, SpanType};
use crate::trace::value::{ToTraceValue, TraceValue};
use crate::utils::truncate;

/// Request metadata values are cut to this many characters.
pub const MAX_CHARS_IN_REQUEST_METADATA: usize = 250;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Why a span ended with an error status.
#[derive(Debug, Clone)]
pub struct Failure {
    pub error_type: String,
    pub message: String,
}

impl Failure {
    pub fn from_error<E: fmt::Display + ?Sized>(error: &E) -> Self {
        Self {
            error_type: std::any::type_name::<E>().to_string(),
            message: error.to_string(),
        }
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::panicked(panic_message(payload).unwrap_or_else(|| "panicked".to_string()))
    }

    fn panicked(message: String) -> Self {
        Self {
            error_type: "panic".to_string(),
            message,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
}

thread_local! {
    // Message of the panic currently unwinding this thread, if any.
    static UNWINDING: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chains a hook in front of the installed one that remembers each panic's
/// message, so a [`SpanGuard`] dropped by the unwind can record it.
fn capture_panic_messages() {
    if std::thread::panicking() {
        return;
    }
    UNWINDING.with(|slot| slot.borrow_mut().take());
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let message = panic_message(info.payload());
            UNWINDING.with(|slot| *slot.borrow_mut() = message);
            previous(info);
        }));
    });
}

/// The spans of one trace collected while its root span is still open.
pub(crate) struct TraceBuffer {
    request_id: String,
    experiment_id: String,
    client: Arc<dyn TraceClient>,
    state: Mutex<BufferState>,
}

#[derive(Default)]
struct BufferState {
    next_seq: usize,
    finished: Vec<(usize, Span)>,
    tags: IndexMap<String, String>,
    exported: bool,
}

impl TraceBuffer {
    pub(crate) fn new(experiment_id: String, client: Arc<dyn TraceClient>) -> Arc<Self> {
        Arc::new(Self {
            request_id: uuid::Uuid::new_v4().simple().to_string(),
            experiment_id,
            client,
            state: Mutex::new(BufferState::default()),
        })
    }

    fn reserve_slot(&self) -> usize {
        let mut state = lock(&self.state);
        let seq = state.next_seq;
        state.next_seq += 1;
        seq
    }

    fn set_tag(&self, key: String, value: String) {
        lock(&self.state).tags.insert(key, value);
    }

    fn finish_span(&self, seq: usize, span: Span) {
        let is_root = span.is_root();
        let trace = {
            let mut state = lock(&self.state);
            if state.exported {
                warn!(
                    request_id = %self.request_id,
                    span_id = %span.span_id(),
                    "span ended after its trace was exported; dropping it"
                );
                return;
            }
            state.finished.push((seq, span));
            if !is_root {
                return;
            }
            state.exported = true;
            let open = state.next_seq - state.finished.len();
            if open > 0 {
                warn!(request_id = %self.request_id, open, "trace exported with unfinished spans");
            }
            let mut finished = std::mem::take(&mut state.finished);
            finished.sort_by_key(|(seq, _)| *seq);
            let spans: Vec<Span> = finished.into_iter().map(|(_, span)| span).collect();
            self.assemble(spans, std::mem::take(&mut state.tags))
        };
        if let Some(trace) = trace {
            debug!(
                request_id = %trace.info.request_id,
                spans = trace.data.spans.len(),
                status = ?trace.info.status,
                execution_time_ms = trace.info.execution_time_ms,
                "trace completed"
            );
            self.client.log_trace(trace);
        }
    }

    fn assemble(&self, spans: Vec<Span>, tags: IndexMap<String, String>) -> Option<Trace> {
        let root = spans.iter().find(|span| span.is_root())?;
        let mut request_metadata = IndexMap::new();
        request_metadata.insert(metadata_key::NAME.to_string(), root.name.clone());
        request_metadata.insert(
            metadata_key::INPUTS.to_string(),
            metadata_json(root.inputs.as_ref(), &self.request_id),
        );
        request_metadata.insert(
            metadata_key::OUTPUTS.to_string(),
            metadata_json(root.outputs.as_ref(), &self.request_id),
        );
        let info = TraceInfo {
            request_id: self.request_id.clone(),
            experiment_id: self.experiment_id.clone(),
            timestamp_ms: root.start_time / 1_000_000,
            execution_time_ms: root.duration_ns() / 1_000_000,
            status: TraceStatus::from(root.status.status_code),
            request_metadata,
            tags,
        };
        Some(Trace {
            info,
            data: TraceData { spans },
        })
    }
}

fn metadata_json(value: Option<&TraceValue>, request_id: &str) -> String {
    let encoded = value
        .map(|v| TraceJsonEncoder.encode(v))
        .transpose()
        .and_then(|v| encoder::to_string(&v.unwrap_or_default()));
    match encoded {
        Ok(json) => truncate(&json, MAX_CHARS_IN_REQUEST_METADATA).to_string(),
        Err(err) => {
            warn!(request_id, error = %err, "could not encode request metadata");
            String::new()
        }
    }
}

struct SpanRecord {
    name: String,
    span_type: SpanType,
    start_time: i64,
    end_time: Option<i64>,
    status: SpanStatus,
    inputs: Option<TraceValue>,
    outputs: Option<TraceValue>,
    attributes: IndexMap<String, TraceValue>,
    events: Vec<SpanEvent>,
}

struct LiveSpanInner {
    context: SpanContext,
    parent_span_id: Option<String>,
    seq: usize,
    trace: Arc<TraceBuffer>,
    record: Mutex<SpanRecord>,
}

/// A span that has started and not yet ended.
///
/// Cheap to clone; every clone refers to the same span. Ending it more than
/// once is a no-op.
#[derive(Clone)]
pub struct LiveSpan {
    inner: Arc<LiveSpanInner>,
}

impl fmt::Debug for LiveSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSpan")
            .field("request_id", &self.inner.context.request_id)
            .field("span_id", &self.inner.context.span_id)
            .field("parent_span_id", &self.inner.parent_span_id)
            .field("name", &lock(&self.inner.record).name)
            .finish()
    }
}

impl LiveSpan {
    /// Starts a span under `parent`, or as the root of a new trace.
    pub(crate) fn start(
        name: String,
        span_type: SpanType,
        attributes: IndexMap<String, TraceValue>,
        parent: Option<&LiveSpan>,
        new_trace: impl FnOnce() -> Arc<TraceBuffer>,
    ) -> Self {
        let (trace, parent_span_id) = match parent {
            Some(parent) => (parent.inner.trace.clone(), Some(parent.span_id().to_string())),
            None => (new_trace(), None),
        };
        let span_id = format!("{:016x}", rand::random::<u64>());
        let seq = trace.reserve_slot();
        trace!(
            request_id = %trace.request_id,
            %span_id,
            parent_span_id = ?parent_span_id,
            %name,
            "span started"
        );
        Self {
            inner: Arc::new(LiveSpanInner {
                context: SpanContext {
                    request_id: trace.request_id.clone(),
                    span_id,
                },
                parent_span_id,
                seq,
                trace,
                record: Mutex::new(SpanRecord {
                    name,
                    span_type,
                    start_time: super::now_ns(),
                    end_time: None,
                    status: SpanStatus::default(),
                    inputs: None,
                    outputs: None,
                    attributes,
                    events: Vec::new(),
                }),
            }),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.inner.context.request_id
    }

    pub fn span_id(&self) -> &str {
        &self.inner.context.span_id
    }

    pub fn parent_span_id(&self) -> Option<&str> {
        self.inner.parent_span_id.as_deref()
    }

    pub fn name(&self) -> String {
        lock(&self.inner.record).name.clone()
    }

    pub fn is_ended(&self) -> bool {
        lock(&self.inner.record).end_time.is_some()
    }

    pub fn set_inputs(&self, inputs: impl ToTraceValue) {
        lock(&self.inner.record).inputs = Some(inputs.to_trace_value());
    }

    pub fn set_outputs(&self, outputs: impl ToTraceValue) {
        lock(&self.inner.record).outputs = Some(outputs.to_trace_value());
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl ToTraceValue) {
        lock(&self.inner.record)
            .attributes
            .insert(key.into(), value.to_trace_value());
    }

    pub fn set_attributes<K, V>(&self, attributes: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: ToTraceValue,
    {
        let mut record = lock(&self.inner.record);
        for (key, value) in attributes {
            record.attributes.insert(key.into(), value.to_trace_value());
        }
    }

    pub fn add_event(&self, event: SpanEvent) {
        lock(&self.inner.record).events.push(event);
    }

    pub fn set_status(&self, status: SpanStatus) {
        lock(&self.inner.record).status = status;
    }

    /// Tags the whole trace this span belongs to.
    pub fn set_trace_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.trace.set_tag(key.into(), value.into());
    }

    /// Marks the span failed and records an `exception` event.
    pub fn record_failure(&self, failure: &Failure) {
        let mut record = lock(&self.inner.record);
        record.status = SpanStatus::error(failure.message.clone());
        record.events.push(
            SpanEvent::new("exception")
                .with_attribute("exception.type", failure.error_type.as_str())
                .with_attribute("exception.message", failure.message.as_str()),
        );
    }

    /// Records the outcome of the wrapped call and ends the span.
    pub(crate) fn finish(&self, outcome: Result<TraceValue, Failure>) {
        match outcome {
            Ok(outputs) => lock(&self.inner.record).outputs = Some(outputs),
            Err(failure) => self.record_failure(&failure),
        }
        self.end();
    }

    /// Ends the span. An unset status becomes OK.
    pub fn end(&self) {
        let span = {
            let mut record = lock(&self.inner.record);
            if record.end_time.is_some() {
                return;
            }
            let end_time = super::now_ns();
            record.end_time = Some(end_time);
            if record.status.status_code == SpanStatusCode::Unset {
                record.status = SpanStatus::ok();
            }
            Span {
                name: record.name.clone(),
                context: self.inner.context.clone(),
                span_type: record.span_type.clone(),
                parent_span_id: self.inner.parent_span_id.clone(),
                start_time: record.start_time,
                end_time,
                status: record.status.clone(),
                inputs: record.inputs.clone(),
                outputs: record.outputs.clone(),
                attributes: record.attributes.clone(),
                events: record.events.clone(),
            }
        };
        trace!(
            request_id = %span.context.request_id,
            span_id = %span.context.span_id,
            status = ?span.status.status_code,
            duration_ns = span.duration_ns(),
            "span ended"
        );
        self.inner.trace.finish_span(self.inner.seq, span);
    }
}

/// A span entered on the current call stack. Ends the span when dropped.
///
/// While the guard is alive, spans started on the same call stack become its
/// children. Inside a traced future that stack belongs to the future; elsewhere
/// it belongs to the thread, so a guard held across an `.await` in untraced
/// async code is seen by whatever else that thread polls. Use
/// [`Tracer::in_span`](crate::trace::Tracer::in_span) there instead.
///
/// A guard dropped during a panic marks the span failed with the panic message.
/// If another panic hook replaced the one installed on first use, the message
/// falls back to `"panicked"`.
pub struct SpanGuard {
    span: LiveSpan,
    _entered: StackEntry,
}

impl SpanGuard {
    pub(crate) fn enter(span: LiveSpan) -> Self {
        capture_panic_messages();
        let entered = context::enter(&span);
        Self {
            span,
            _entered: entered,
        }
    }

    pub fn span(&self) -> &LiveSpan {
        &self.span
    }

    pub fn end(self) {}
}

impl Deref for SpanGuard {
    type Target = LiveSpan;

    fn deref(&self) -> &LiveSpan {
        &self.span
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if self.span.is_ended() {
            return;
        }
        if std::thread::panicking() {
            let message = UNWINDING.with(|slot| slot.borrow().clone());
            self.span.record_failure(&Failure::panicked(
                message.unwrap_or_else(|| "panicked".to_string()),
            ));
        }
        self.span.end();
    }
}
