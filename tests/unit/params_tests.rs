//! Unit tests for job-record parameter coercion.

use member_relay::engine::params::load_params;
use member_relay::store::Record;
use serde_json::json;

#[test]
fn object_params_pass_through() {
    let mut record = Record::new("scheduled_jobs");
    record.set("params", json!({"from_number": "+15550001111", "n": 3}));

    let params = load_params(&record);
    assert_eq!(params.get("from_number"), Some(&json!("+15550001111")));
    assert_eq!(params.get("n"), Some(&json!(3)));
}

#[test]
fn json_string_params_decode() {
    let mut record = Record::new("scheduled_jobs");
    record.set("params", json!(r#"{"topic": "Town Hall"}"#));

    let params = load_params(&record);
    assert_eq!(params.get("topic"), Some(&json!("Town Hall")));
}

#[test]
fn missing_params_yield_empty_map() {
    let record = Record::new("scheduled_jobs");
    assert!(load_params(&record).is_empty());
}

#[test]
fn null_params_yield_empty_map() {
    let mut record = Record::new("scheduled_jobs");
    record.set("params", json!(null));
    assert!(load_params(&record).is_empty());
}

#[test]
fn malformed_string_params_yield_empty_map() {
    let mut record = Record::new("scheduled_jobs");
    record.set("params", json!("{not json"));
    assert!(load_params(&record).is_empty());
}

#[test]
fn array_params_yield_empty_map() {
    let mut record = Record::new("scheduled_jobs");
    record.set("params", json!([1, 2, 3]));
    assert!(load_params(&record).is_empty());
}
