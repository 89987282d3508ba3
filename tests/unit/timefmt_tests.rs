//! Unit tests for Eastern-time display formatting.

use chrono::{TimeZone, Utc};
use member_relay::timefmt::{format_due_date, format_eastern};

#[test]
fn winter_dates_format_as_est() {
    let utc = Utc.with_ymd_and_hms(2026, 1, 15, 17, 0, 0).unwrap();
    assert_eq!(format_eastern(utc), "01/15/2026 12:00 PM EST");
}

#[test]
fn summer_dates_format_as_edt() {
    let utc = Utc.with_ymd_and_hms(2026, 7, 4, 18, 30, 0).unwrap();
    assert_eq!(format_eastern(utc), "07/04/2026 02:30 PM EDT");
}

#[test]
fn midnight_utc_rolls_back_a_day_in_eastern() {
    let utc = Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap();
    assert_eq!(format_eastern(utc), "02/28/2026 09:00 PM EST");
}

#[test]
fn due_date_uses_short_form() {
    let utc = Utc.with_ymd_and_hms(2026, 8, 10, 15, 0, 0).unwrap();
    assert_eq!(format_due_date(utc), "08/10/2026");
}

#[test]
fn repeated_formatting_is_stable() {
    let utc = Utc.with_ymd_and_hms(2026, 11, 2, 12, 0, 0).unwrap();
    assert_eq!(format_eastern(utc), format_eastern(utc));
}
