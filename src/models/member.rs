//! Member view over `members` collection rows.

use chrono::{DateTime, Utc};

use crate::store::Record;

/// The member fields the registration sweep and handlers care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Record id in the `members` collection.
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub group: String,
    /// Membership expiration, when set.
    pub expiration: Option<DateTime<Utc>>,
}

impl Member {
    /// Build the view from a `members` record.
    #[must_use]
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id().to_owned(),
            first_name: record.get_string("first_name"),
            last_name: record.get_string("last_name"),
            email: record.get_string("email"),
            phone: record.get_string("phone"),
            company: record.get_string("company"),
            group: record.get_string("member_group"),
            expiration: record.get_datetime("expiration"),
        }
    }

    /// Display name used for email recipients.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
