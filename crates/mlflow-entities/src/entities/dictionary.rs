//! Typed lookups over the plain `Map<String, Value>` dictionaries entities are
//! converted to and from.

use serde_json::{Map, Value};

use crate::core::EntityError;

pub type Dictionary = Map<String, Value>;

pub(crate) fn required<'a>(dict: &'a Dictionary, key: &str) -> Result<&'a Value, EntityError> {
    dict.get(key).ok_or_else(|| EntityError::missing(key))
}

pub(crate) fn required_str(dict: &Dictionary, key: &str) -> Result<String, EntityError> {
    as_string(key, required(dict, key)?)
}

pub(crate) fn required_i64(dict: &Dictionary, key: &str) -> Result<i64, EntityError> {
    let value = required(dict, key)?;
    value
        .as_i64()
        .ok_or_else(|| EntityError::invalid(key, "an integer", value))
}

pub(crate) fn required_f64(dict: &Dictionary, key: &str) -> Result<f64, EntityError> {
    let value = required(dict, key)?;
    value
        .as_f64()
        .ok_or_else(|| EntityError::invalid(key, "a number", value))
}

pub(crate) fn required_object(dict: &Dictionary, key: &str) -> Result<Dictionary, EntityError> {
    as_object(key, required(dict, key)?)
}

/// `None` when the key is absent or explicitly `null`.
pub(crate) fn optional<'a>(dict: &'a Dictionary, key: &str) -> Option<&'a Value> {
    dict.get(key).filter(|value| !value.is_null())
}

pub(crate) fn optional_str(dict: &Dictionary, key: &str) -> Result<Option<String>, EntityError> {
    optional(dict, key).map(|v| as_string(key, v)).transpose()
}

pub(crate) fn optional_object(
    dict: &Dictionary,
    key: &str,
) -> Result<Option<Dictionary>, EntityError> {
    optional(dict, key).map(|v| as_object(key, v)).transpose()
}

/// Reads a list of nested dictionaries and rebuilds each entry with `decode`.
pub(crate) fn optional_list<T>(
    dict: &Dictionary,
    key: &str,
    decode: impl Fn(&Dictionary) -> Result<T, EntityError>,
) -> Result<Option<Vec<T>>, EntityError> {
    let Some(value) = optional(dict, key) else {
        return Ok(None);
    };
    let items = value
        .as_array()
        .ok_or_else(|| EntityError::invalid(key, "an array", value))?;
    items
        .iter()
        .map(|item| {
            let entry = item
                .as_object()
                .ok_or_else(|| EntityError::invalid(key, "an array of objects", item))?;
            decode(entry)
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

pub(crate) fn string_map(
    key: &str,
    dict: Dictionary,
) -> Result<indexmap::IndexMap<String, String>, EntityError> {
    dict.into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => Ok((k, s)),
            other => Err(EntityError::invalid(key, "a map of strings", &other)),
        })
        .collect()
}

/// Parses a JSON document that must be an object at the top level.
pub(crate) fn parse_object(json: &str) -> Result<Dictionary, EntityError> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(map) => Ok(map),
        other => Err(EntityError::invalid("<root>", "an object", &other)),
    }
}

fn as_string(key: &str, value: &Value) -> Result<String, EntityError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| EntityError::invalid(key, "a string", value))
}

fn as_object(key: &str, value: &Value) -> Result<Dictionary, EntityError> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| EntityError::invalid(key, "an object", value))
}
