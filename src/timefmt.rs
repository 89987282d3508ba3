//! Display-time conversion to US Eastern time.
//!
//! Timestamps are UTC everywhere inside the core; conversion happens only
//! when a value is rendered into template parameters.

use chrono::{DateTime, Utc};
use chrono_tz::America::New_York;

/// Format a UTC instant for Eastern-time display, e.g.
/// `07/04/2026 02:30 PM EDT`.
#[must_use]
pub fn format_eastern(utc: DateTime<Utc>) -> String {
    utc.with_timezone(&New_York)
        .format("%m/%d/%Y %I:%M %p %Z")
        .to_string()
}

/// Format a UTC instant as a short date, e.g. `07/04/2026`, for invoice
/// due-date substitution.
#[must_use]
pub fn format_due_date(utc: DateTime<Utc>) -> String {
    utc.with_timezone(&New_York).format("%m/%d/%Y").to_string()
}
