//! Unit tests for typed record field access.

use chrono::{TimeZone, Utc};
use member_relay::store::Record;
use serde::Deserialize;
use serde_json::json;

#[test]
fn string_getter_defaults_to_empty() {
    let mut record = Record::new("members");
    record.set("email", json!("ana@example.com"));

    assert_eq!(record.get_string("email"), "ana@example.com");
    assert_eq!(record.get_string("missing"), "");
}

#[test]
fn numbers_stringify_through_string_getter() {
    let mut record = Record::new("members");
    record.set("zip", json!(33101));
    assert_eq!(record.get_string("zip"), "33101");
}

#[test]
fn bool_getter_requires_true() {
    let mut record = Record::new("scheduled_jobs");
    record.set("done", json!(true));
    assert!(record.get_bool("done"));

    record.set("done", json!(false));
    assert!(!record.get_bool("done"));
    assert!(!record.get_bool("missing"));
}

#[test]
fn float_getter_defaults_to_zero() {
    let mut record = Record::new("invoices");
    record.set("amount", json!(125.5));
    assert!((record.get_float("amount") - 125.5).abs() < f64::EPSILON);
    assert!((record.get_float("missing")).abs() < f64::EPSILON);
}

#[test]
fn datetime_round_trips_through_rfc3339() {
    let when = Utc.with_ymd_and_hms(2026, 8, 2, 14, 30, 0).unwrap();
    let mut record = Record::new("scheduled_jobs");
    record.set_datetime("run_at", when);

    assert_eq!(record.get_datetime("run_at"), Some(when));
    assert_eq!(record.get_datetime("missing"), None);
}

#[test]
fn non_string_datetime_is_none() {
    let mut record = Record::new("scheduled_jobs");
    record.set("run_at", json!(1_725_000_000));
    assert_eq!(record.get_datetime("run_at"), None);
}

#[derive(Debug, Deserialize, PartialEq)]
struct StartParams {
    meeting_id: i64,
    occurrence_id: i64,
}

#[test]
fn unmarshal_accepts_object_fields() {
    let mut record = Record::new("scheduled_jobs");
    record.set("params", json!({"meeting_id": 42, "occurrence_id": 7}));

    let params: StartParams = record.unmarshal_json_field("params").unwrap();
    assert_eq!(
        params,
        StartParams {
            meeting_id: 42,
            occurrence_id: 7
        }
    );
}

#[test]
fn unmarshal_accepts_json_strings() {
    let mut record = Record::new("scheduled_jobs");
    record.set("params", json!(r#"{"meeting_id": 42, "occurrence_id": 7}"#));

    let params: StartParams = record.unmarshal_json_field("params").unwrap();
    assert_eq!(params.meeting_id, 42);
}

#[test]
fn unmarshal_missing_field_errors() {
    let record = Record::new("scheduled_jobs");
    let result: member_relay::Result<StartParams> = record.unmarshal_json_field("params");
    assert!(result.is_err());
}

#[test]
fn expanded_relations_are_retrievable() {
    let mut job = Record::new("scheduled_jobs");
    let mut template = Record::new("email_basic");
    template.set("subject", json!("Hello"));

    job.insert_expanded("email_template", template);
    let expanded = job.expanded_one("email_template").unwrap();
    assert_eq!(expanded.get_string("subject"), "Hello");
    assert!(job.expanded_one("member").is_none());
}
