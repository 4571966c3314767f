use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::trace::encoder::{self, TraceJsonEncoder};

/// Export capabilities of a value that has no native JSON form.
///
/// The encoder tries [`model_dump`](TraceExport::model_dump), then
/// [`raw_fields`](TraceExport::raw_fields), then
/// [`display_string`](TraceExport::display_string). Implement whichever ones
/// the type can support; a type that implements none of them fails to encode.
///
/// ```
/// use mlflow_entities::trace::{TraceExport, TraceValue, encoder};
/// use serde::Serialize;
///
/// #[derive(Debug, Serialize)]
/// struct MyModel {
///     x: i64,
///     y: String,
/// }
///
/// impl TraceExport for MyModel {
///     fn model_dump(&self) -> Option<anyhow::Result<serde_json::Value>> {
///         Some(serde_json::to_value(self).map_err(Into::into))
///     }
/// }
///
/// let value = TraceValue::foreign(MyModel { x: 1, y: "foo".into() });
/// assert_eq!(encoder::to_string(&value).unwrap(), r#"{"x": 1, "y": "foo"}"#);
/// ```
pub trait TraceExport: fmt::Debug + Send + Sync {
    /// The complete mapping form of the value. Used verbatim.
    fn model_dump(&self) -> Option<anyhow::Result<Value>> {
        None
    }

    /// The raw field data of the value. Field values are encoded recursively,
    /// so they may themselves be foreign.
    fn raw_fields(&self) -> Option<anyhow::Result<IndexMap<String, TraceValue>>> {
        None
    }

    /// The human-readable string form of the value.
    fn display_string(&self) -> Option<String> {
        None
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A JSON-shaped value captured from a traced call.
///
/// Unlike [`serde_json::Value`] it can also hold a [`Foreign`](TraceValue::Foreign)
/// object, which is only turned into JSON when the trace is serialized.
#[derive(Debug, Clone, Default)]
pub enum TraceValue {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<TraceValue>),
    Object(IndexMap<String, TraceValue>),
    Foreign(Arc<dyn TraceExport>),
}

impl TraceValue {
    pub fn foreign(value: impl TraceExport + 'static) -> Self {
        Self::Foreign(Arc::new(value))
    }

    /// Captures any serde-serializable value through its JSON form.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::from)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, TraceValue>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Resolves foreign values and returns plain JSON.
    pub fn to_json_value(&self) -> Result<Value, crate::EncodeError> {
        TraceJsonEncoder.encode(self)
    }
}

impl PartialEq for TraceValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Foreign(a), Self::Foreign(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Value> for TraceValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl Serialize for TraceValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => serializer.collect_seq(items),
            Self::Object(map) => serializer.collect_map(map),
            Self::Foreign(_) => match TraceJsonEncoder.encode(self) {
                Ok(value) => value.serialize(serializer),
                Err(err) => Err(encoder::defer_error(err)),
            },
        }
    }
}

impl<'de> Deserialize<'de> for TraceValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from)
    }
}

/// Conversion of call arguments, return values and attributes into a
/// [`TraceValue`].
pub trait ToTraceValue {
    fn to_trace_value(&self) -> TraceValue;
}

impl ToTraceValue for TraceValue {
    fn to_trace_value(&self) -> TraceValue {
        self.clone()
    }
}

impl ToTraceValue for Value {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::from(self.clone())
    }
}

impl ToTraceValue for () {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Null
    }
}

impl ToTraceValue for bool {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Bool(*self)
    }
}

macro_rules! integer_trace_value {
    ($($ty:ty),*) => {
        $(
            impl ToTraceValue for $ty {
                fn to_trace_value(&self) -> TraceValue {
                    TraceValue::Number(Number::from(*self))
                }
            }
        )*
    };
}

integer_trace_value!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl ToTraceValue for f64 {
    fn to_trace_value(&self) -> TraceValue {
        Number::from_f64(*self).map_or(TraceValue::Null, TraceValue::Number)
    }
}

impl ToTraceValue for f32 {
    fn to_trace_value(&self) -> TraceValue {
        f64::from(*self).to_trace_value()
    }
}

impl ToTraceValue for str {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::String(self.to_string())
    }
}

impl ToTraceValue for String {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::String(self.clone())
    }
}

impl ToTraceValue for char {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::String(self.to_string())
    }
}

impl<T: ToTraceValue + ?Sized> ToTraceValue for &T {
    fn to_trace_value(&self) -> TraceValue {
        (**self).to_trace_value()
    }
}

impl<T: ToTraceValue + ?Sized> ToTraceValue for &mut T {
    fn to_trace_value(&self) -> TraceValue {
        (**self).to_trace_value()
    }
}

impl<T: ToTraceValue + ?Sized> ToTraceValue for Box<T> {
    fn to_trace_value(&self) -> TraceValue {
        (**self).to_trace_value()
    }
}

impl<T: ToTraceValue + ?Sized> ToTraceValue for Arc<T> {
    fn to_trace_value(&self) -> TraceValue {
        (**self).to_trace_value()
    }
}

impl<T: ToTraceValue> ToTraceValue for Option<T> {
    fn to_trace_value(&self) -> TraceValue {
        self.as_ref()
            .map_or(TraceValue::Null, ToTraceValue::to_trace_value)
    }
}

impl<T: ToTraceValue> ToTraceValue for [T] {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Array(self.iter().map(ToTraceValue::to_trace_value).collect())
    }
}

impl<T: ToTraceValue, const N: usize> ToTraceValue for [T; N] {
    fn to_trace_value(&self) -> TraceValue {
        self.as_slice().to_trace_value()
    }
}

impl<T: ToTraceValue> ToTraceValue for Vec<T> {
    fn to_trace_value(&self) -> TraceValue {
        self.as_slice().to_trace_value()
    }
}

impl<T: ToTraceValue> ToTraceValue for IndexMap<String, T> {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Object(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_trace_value()))
                .collect(),
        )
    }
}

impl<T: ToTraceValue> ToTraceValue for BTreeMap<String, T> {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Object(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_trace_value()))
                .collect(),
        )
    }
}

impl<T: ToTraceValue, S> ToTraceValue for HashMap<String, T, S> {
    fn to_trace_value(&self) -> TraceValue {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        TraceValue::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.clone(), v.to_trace_value()))
                .collect(),
        )
    }
}

impl ToTraceValue for NaiveDateTime {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::foreign(*self)
    }
}

impl<Tz> ToTraceValue for DateTime<Tz>
where
    Tz: TimeZone + 'static,
    Tz::Offset: fmt::Display + Send + Sync,
{
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::foreign(self.clone())
    }
}

/// Date-times render the way Python's `str(datetime)` does:
/// `2024-05-01 12:34:56.789012`, fraction only when non-zero, microsecond precision.
impl TraceExport for NaiveDateTime {
    fn display_string(&self) -> Option<String> {
        Some(python_datetime_str(self))
    }
}

impl<Tz> TraceExport for DateTime<Tz>
where
    Tz: TimeZone + 'static,
    Tz::Offset: fmt::Display + Send + Sync,
{
    fn display_string(&self) -> Option<String> {
        let local = python_datetime_str(&self.naive_local());
        Some(format!("{local}{}", self.format("%:z")))
    }
}

fn python_datetime_str(value: &NaiveDateTime) -> String {
    let micros = value.nanosecond() % 1_000_000_000 / 1_000;
    let base = value.format("%Y-%m-%d %H:%M:%S");
    if micros == 0 {
        base.to_string()
    } else {
        format!("{base}.{micros:06}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn at(micro: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_micro_opt(12, 34, 56, micro)
            .unwrap()
    }

    #[test]
    fn naive_datetime_matches_python_str() {
        assert_eq!(
            at(789_012).display_string().as_deref(),
            Some("2024-05-01 12:34:56.789012")
        );
        assert_eq!(at(0).display_string().as_deref(), Some("2024-05-01 12:34:56"));
    }

    #[test]
    fn aware_datetime_carries_offset() {
        let aware = Utc.from_utc_datetime(&at(5));
        assert_eq!(
            aware.display_string().as_deref(),
            Some("2024-05-01 12:34:56.000005+00:00")
        );
    }

    #[test]
    fn hash_maps_capture_in_key_order() {
        let map: HashMap<String, i32> = [("b".to_string(), 2), ("a".to_string(), 1)].into();
        let keys: Vec<_> = map
            .to_trace_value()
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn non_finite_floats_become_null() {
        assert!(f64::NAN.to_trace_value().is_null());
    }
}
