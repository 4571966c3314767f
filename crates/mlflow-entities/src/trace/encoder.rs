//! JSON encoding for trace data.
//!
//! Native values map straight onto JSON. [`TraceValue::Foreign`] objects go
//! through [`TraceJsonEncoder::fallback`], which asks the object for its export
//! capabilities in a fixed order. The string form produced by [`to_string`]
//! follows Python's `json.dumps` layout (`", "` and `": "` separators, non-ASCII
//! escaped), so metadata strings read the same on both sides.

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::io;
use tracing::trace;

use crate::core::EncodeError;
use crate::trace::value::{TraceExport, TraceValue};

thread_local! {
    // Fallback failure raised inside `Serialize for TraceValue`, picked up by `to_string`.
    static DEFERRED: RefCell<Option<EncodeError>> = const { RefCell::new(None) };
}

/// Parks `err` for [`to_string`] and hands the serializer a stand-in carrying
/// the same message.
pub(crate) fn defer_error<E: serde::ser::Error>(err: EncodeError) -> E {
    let stand_in = E::custom(&err);
    DEFERRED.with(|slot| *slot.borrow_mut() = Some(err));
    stand_in
}

fn take_deferred() -> Option<EncodeError> {
    DEFERRED.with(|slot| slot.borrow_mut().take())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TraceJsonEncoder;

impl TraceJsonEncoder {
    pub fn encode(&self, value: &TraceValue) -> Result<Value, EncodeError> {
        match value {
            TraceValue::Null => Ok(Value::Null),
            TraceValue::Bool(b) => Ok(Value::Bool(*b)),
            TraceValue::Number(n) => Ok(Value::Number(n.clone())),
            TraceValue::String(s) => Ok(Value::String(s.clone())),
            TraceValue::Array(items) => items
                .iter()
                .map(|item| self.encode(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            TraceValue::Object(map) => self.encode_fields(map.iter()),
            TraceValue::Foreign(object) => self.fallback(object.as_ref()),
        }
    }

    /// Converts an object with no native JSON form.
    ///
    /// Order: mapping export, raw field export (re-encoded recursively),
    /// string form. Errors raised by a capability are returned unchanged.
    pub fn fallback(&self, object: &dyn TraceExport) -> Result<Value, EncodeError> {
        if let Some(dumped) = object.model_dump() {
            trace!(type_name = object.type_name(), "encoding via model_dump");
            return dumped.map_err(EncodeError::Export);
        }
        if let Some(fields) = object.raw_fields() {
            trace!(type_name = object.type_name(), "encoding via raw_fields");
            let fields = fields.map_err(EncodeError::Export)?;
            return self.encode_fields(fields.iter());
        }
        if let Some(display) = object.display_string() {
            trace!(type_name = object.type_name(), "encoding via display_string");
            return Ok(Value::String(display));
        }
        Err(EncodeError::NotSerializable {
            type_name: object.type_name(),
        })
    }

    fn encode_fields<'a>(
        &self,
        fields: impl Iterator<Item = (&'a String, &'a TraceValue)>,
    ) -> Result<Value, EncodeError> {
        let mut out = Map::new();
        for (key, value) in fields {
            out.insert(key.clone(), self.encode(value)?);
        }
        Ok(Value::Object(out))
    }
}

/// `serde_json` formatter reproducing Python's default `json.dumps` output.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonFormatter;

impl Formatter for PythonFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..idx])?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = idx + ch.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}

/// Serializes any value with the Python layout. Foreign values inside
/// [`TraceValue`]s are resolved through the fallback chain, and a fallback
/// failure comes back as the [`EncodeError`] the chain produced.
pub fn to_string<T: Serialize + ?Sized>(value: &T) -> Result<String, EncodeError> {
    take_deferred();
    let mut buf = Vec::with_capacity(128);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PythonFormatter);
    if let Err(err) = value.serialize(&mut serializer) {
        return Err(take_deferred().unwrap_or(EncodeError::Json(err)));
    }
    // The formatter only ever writes ASCII.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
