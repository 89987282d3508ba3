//! Per-member meeting registration rows (`member_zoom` collection).

use chrono::{DateTime, Utc};

use crate::store::{Record, RecordStore};
use crate::Result;

/// One successful meeting registration for one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRegistration {
    /// Member record id.
    pub member_id: String,
    /// Personal join URL returned by the provider.
    pub join_url: String,
    /// Occurrence start.
    pub start: DateTime<Utc>,
    /// Occurrence end (start plus duration).
    pub end: DateTime<Utc>,
    /// Meeting topic.
    pub title: String,
}

impl MemberRegistration {
    /// Insert a new `member_zoom` row. Rows are inserted unconditionally;
    /// re-registration produces a new row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the write fails.
    pub async fn create(&self, store: &RecordStore) -> Result<()> {
        let mut record = Record::new("member_zoom");
        record.set("member", self.member_id.clone());
        record.set("join_url", self.join_url.clone());
        record.set_datetime("start", self.start);
        record.set_datetime("end", self.end);
        record.set("title", self.title.clone());
        store.save(&record).await
    }
}
