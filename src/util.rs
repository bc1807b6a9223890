//! Small shared helpers.

use chrono::Utc;

/// Fresh TEXT id for a new row.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current UTC time as RFC 3339, the timestamp format used across the schema.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Truncate a string to at most `max` chars (error messages stored in the
/// enrichment queue are capped at 500).
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Build a full name from first/last parts, skipping empties.
pub fn join_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    let joined = [first, last]
        .iter()
        .flatten()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}
