//! Job-record parameter coercion.
//!
//! The `params` field arrives from the store as an object, a JSON-encoded
//! string, or nothing at all, depending on how the row was written.
//! Handlers see a plain map either way.

use serde_json::{Map, Value};
use tracing::warn;

use crate::store::Record;

/// Read the free-form `params` object from a job record.
///
/// Malformed content is logged and treated as empty rather than failing the
/// job: individual handlers validate the fields they actually require.
#[must_use]
pub fn load_params(record: &Record) -> Map<String, Value> {
    match record.get("params") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(raw)) => match serde_json::from_str::<Map<String, Value>>(raw) {
            Ok(map) => map,
            Err(err) => {
                warn!(job = record.id(), %err, "params string does not decode; treating as empty");
                Map::new()
            }
        },
        Some(other) => {
            warn!(
                job = record.id(),
                kind = %value_kind(other),
                "unexpected params shape; treating as empty"
            );
            Map::new()
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
