//! Shared helpers: wall-clock timestamps and their document formats.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as milliseconds since Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn to_datetime(millis: u64) -> DateTime<Utc> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_default()
}

/// ISO-8601 UTC with millisecond precision, e.g. `2014-03-01T12:00:00.000Z`.
pub fn format_timestamp(millis: u64) -> String {
    to_datetime(millis).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// UTC calendar date of `millis` rendered with a strftime pattern.
///
/// The pattern must have passed [`is_valid_date_format`].
pub fn format_date(millis: u64, pattern: &str) -> String {
    to_datetime(millis).format(pattern).to_string()
}

/// Whether `pattern` is a usable strftime pattern.
pub fn is_valid_date_format(pattern: &str) -> bool {
    !pattern.is_empty() && StrftimeItems::new(pattern).all(|item| !matches!(item, Item::Error))
}

/// Whether `value` can stand alone as one url path segment without escaping:
/// no separators, query or fragment markers, and not a dot segment.
pub fn is_path_segment(value: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9._+-]+$").expect("path segment pattern is a valid regex"));
    pattern.is_match(value) && value != "." && value != ".."
}
