//! Generic persisted record with typed field access.
//!
//! Handlers consume records through these getters rather than per-collection
//! structs: collections are schemaless from the core's point of view, and
//! per-handler typed decoding happens once at handler entry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{AppError, Result};

/// One row of a named collection: an opaque string id plus a field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    collection: String,
    id: String,
    fields: Map<String, Value>,
    expanded: HashMap<String, Record>,
}

impl Record {
    /// Create an empty record with a generated id.
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: Uuid::new_v4().to_string(),
            fields: Map::new(),
            expanded: HashMap::new(),
        }
    }

    /// Reconstruct a record fetched from the store.
    #[must_use]
    pub fn from_parts(
        collection: impl Into<String>,
        id: impl Into<String>,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            fields,
            expanded: HashMap::new(),
        }
    }

    /// Collection this record belongs to.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Opaque unique identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw field map, as stored.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Raw field value, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// String field; empty when missing or not a string.
    #[must_use]
    pub fn get_string(&self, name: &str) -> String {
        match self.fields.get(name) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    /// Boolean field; `false` when missing.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> bool {
        matches!(self.fields.get(name), Some(Value::Bool(true)))
    }

    /// Numeric field as `f64`; `0.0` when missing.
    #[must_use]
    pub fn get_float(&self, name: &str) -> f64 {
        self.fields.get(name).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Timestamp field stored as an RFC 3339 string.
    #[must_use]
    pub fn get_datetime(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.fields.get(name)? {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Decode a field into a typed value.
    ///
    /// Accepts the three shapes the store may hand back: a JSON object, a
    /// JSON-encoded string, or null (decoded as `T`'s representation of
    /// null, typically an error for structs).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` when the field cannot be decoded into `T`.
    pub fn unmarshal_json_field<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.fields.get(name).cloned().unwrap_or(Value::Null);
        let decoded = match value {
            Value::String(raw) => serde_json::from_str(&raw),
            other => serde_json::from_value(other),
        };
        decoded.map_err(|err| {
            AppError::Store(format!(
                "field {name} of {}/{} does not decode: {err}",
                self.collection, self.id
            ))
        })
    }

    /// Set a field value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Set a timestamp field as an RFC 3339 string.
    pub fn set_datetime(&mut self, name: impl Into<String>, when: DateTime<Utc>) {
        self.fields.insert(
            name.into(),
            Value::String(when.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        );
    }

    /// A previously expanded relation, by field name.
    #[must_use]
    pub fn expanded_one(&self, name: &str) -> Option<&Record> {
        self.expanded.get(name)
    }

    /// Attach an expanded relation record.
    pub fn insert_expanded(&mut self, name: impl Into<String>, record: Record) {
        self.expanded.insert(name.into(), record);
    }
}
