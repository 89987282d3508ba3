//! Record-store facade over the embedded database.
//!
//! The core consumes records through this surface only; collection schemas
//! and the on-disk format belong to the surrounding runtime.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::store::db::Database;
use crate::store::record::Record;
use crate::{AppError, Result};

/// Row shape returned by the store: the record id forced to a plain string
/// plus the remaining fields.
#[derive(Debug, Deserialize)]
struct Row {
    id: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

/// Facade over the embedded database exposing the operations the core needs.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Database>,
}

impl RecordStore {
    /// Wrap a connected database.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fetch a single record by collection and id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no such record exists, or
    /// `AppError::Store` on query failure.
    pub async fn find_by_id(&self, collection: &str, id: &str) -> Result<Record> {
        let mut response = self
            .db
            .query("SELECT *, record::id(id) AS id FROM type::thing($tb, $id)")
            .bind(("tb", collection.to_owned()))
            .bind(("id", id.to_owned()))
            .await?;
        let rows: Vec<Row> = response.take(0)?;
        rows.into_iter()
            .next()
            .map(|row| Record::from_parts(collection, row.id, row.fields))
            .ok_or_else(|| AppError::NotFound(format!("{collection}/{id}")))
    }

    /// Fetch records matching an opaque filter expression.
    ///
    /// `sort` follows the `-field` convention for descending order; empty
    /// means unspecified. `limit == 0` means no limit.
    ///
    /// The filter is a single WHERE expression by contract. Expressions and
    /// sort fields cannot be parameterized, so they are checked before they
    /// enter the query text: the filter must not contain a statement
    /// boundary outside a string literal, and the sort field must be a
    /// plain identifier. Limit and offset are bound like every other value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` on query failure, or when the filter or
    /// sort fails validation.
    pub async fn find_by_filter(
        &self,
        collection: &str,
        filter: &str,
        sort: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>> {
        let mut query = String::from("SELECT *, record::id(id) AS id FROM type::table($tb)");
        if !filter.is_empty() {
            ensure_single_expression(filter)?;
            query.push_str(" WHERE ");
            query.push_str(filter);
        }
        if !sort.is_empty() {
            let (field, dir) = match sort.strip_prefix('-') {
                Some(field) => (field, "DESC"),
                None => (sort, "ASC"),
            };
            ensure_field_name(field)?;
            query.push_str(&format!(" ORDER BY {field} {dir}"));
        }
        if limit > 0 {
            query.push_str(" LIMIT $limit");
        }
        if offset > 0 {
            query.push_str(" START $start");
        }

        let mut response = self
            .db
            .query(query)
            .bind(("tb", collection.to_owned()))
            .bind(("limit", limit))
            .bind(("start", offset))
            .await?;
        let rows: Vec<Row> = response.take(0)?;
        debug!(collection, rows = rows.len(), "filter query");
        Ok(rows
            .into_iter()
            .map(|row| Record::from_parts(collection, row.id, row.fields))
            .collect())
    }

    /// Persist a record, creating or replacing its row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` on write failure.
    pub async fn save(&self, record: &Record) -> Result<()> {
        self.db
            .query("UPSERT type::thing($tb, $id) CONTENT $data")
            .bind(("tb", record.collection().to_owned()))
            .bind(("id", record.id().to_owned()))
            .bind(("data", Value::Object(record.fields().clone())))
            .await?
            .check()?;
        Ok(())
    }

    /// Dereference relation fields in place.
    ///
    /// Each entry pairs the relation field name on `record` with the target
    /// collection holding the related row. Expanded records become available
    /// through [`Record::expanded_one`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Handler` if a relation field is empty, or the
    /// lookup's own error when the related row cannot be fetched.
    pub async fn expand(&self, record: &mut Record, relations: &[(&str, &str)]) -> Result<()> {
        for (field, target) in relations {
            let related_id = record.get_string(field);
            if related_id.is_empty() {
                return Err(AppError::Handler(format!(
                    "record {}/{} has no {field} relation to expand",
                    record.collection(),
                    record.id()
                )));
            }
            let related = self.find_by_id(target, &related_id).await?;
            record.insert_expanded(*field, related);
        }
        Ok(())
    }
}

/// Reject filter text containing a statement boundary outside a string
/// literal, so an expression can never smuggle a second statement into the
/// query.
fn ensure_single_expression(filter: &str) -> Result<()> {
    let mut quote: Option<char> = None;
    for ch in filter.chars() {
        match (quote, ch) {
            (Some(q), _) if ch == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, ';') => {
                return Err(AppError::Store(
                    "filter must be a single expression".into(),
                ))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Sort fields must be plain identifiers; anything else is rejected rather
/// than spliced into the ORDER BY clause.
fn ensure_field_name(field: &str) -> Result<()> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::Store(format!("invalid sort field: {field}")))
    }
}
