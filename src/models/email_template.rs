//! Email template view over `email_basic` collection rows.

use crate::store::Record;

/// Subject and HTML body with `{{params.X}}` placeholders, plus the
/// optional day bucket used by reminder selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    pub subject: String,
    /// HTML body with placeholders.
    pub html: String,
    /// Reminder day bucket, when this template belongs to a reminder series.
    pub days: Option<i64>,
}

impl EmailTemplate {
    /// Build the view from an `email_basic` record.
    #[must_use]
    pub fn from_record(record: &Record) -> Self {
        let days = record
            .get("days")
            .and_then(serde_json::Value::as_i64);
        Self {
            subject: record.get_string("subject"),
            html: record.get_string("html"),
            days,
        }
    }
}
