//! Evaluation records and function-call tracing for MLflow-style experiment tracking.
//!
//! - [`entities`]: the [`Evaluation`] record with its [`Feedback`] and [`Metric`]
//!   entries, each converting to and from a plain JSON dictionary.
//! - [`trace`]: the [`#[trace]`](macro@trace) attribute and the runtime behind it,
//!   which turn instrumented calls into a tree of spans, plus the JSON encoder
//!   that serializes span data containing non-JSON values.

// Lets `#[trace]` expansions name `::mlflow_entities` from inside this crate.
extern crate self as mlflow_entities;

pub mod core;
pub mod entities;
pub mod trace;
pub mod utils;

pub use crate::core::*;
pub use crate::entities::*;
pub use crate::trace::{
    SpanOptions, SpanType, ToTraceValue, Trace, TraceExport, TraceValue, Tracer,
};
pub use crate::utils::*;

pub use mlflow_macros::trace;

/// Builds an ordered attribute map for [`SpanOptions`] or `#[trace(attributes = ...)]`.
///
/// ```
/// use mlflow_entities::attributes;
///
/// let attrs = attributes! { "delta" => 1, "model" => "small" };
/// assert_eq!(attrs.keys().collect::<Vec<_>>(), ["delta", "model"]);
/// ```
#[macro_export]
macro_rules! attributes {
    () => {
        $crate::trace::TraceFields::new()
    };

    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::trace::TraceFields::new();
        $(
            fields.insert(
                ::std::string::String::from($key),
                $crate::trace::ToTraceValue::to_trace_value(&$value),
            );
        )+
        fields
    }};
}
