//! Recipient phone normalization to E.164.

/// Normalize a US phone number to `+1XXXXXXXXXX` form.
///
/// Accepts bare ten-digit numbers, dashed/dotted/parenthesized formats,
/// and numbers already carrying a leading `1` or `+`. Non-digits are
/// stripped; an eleven-digit number starting with `1` keeps its country
/// code, anything else is assumed domestic.
#[must_use]
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 11 && digits.starts_with('1') {
        format!("+{digits}")
    } else {
        format!("+1{digits}")
    }
}
