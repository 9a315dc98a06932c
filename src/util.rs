//! Small time and identifier helpers shared by the content builders.

use chrono::{DateTime, FixedOffset, Utc};

/// Parse an ISO 8601 / RFC 3339 timestamp, keeping the offset it was
/// published with so times can be shown in the feed's local clock.
pub fn parse_iso8601(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok()
}

/// Epoch milliseconds of a timestamp, in UTC.
pub fn epoch_ms(value: &DateTime<FixedOffset>) -> i64 {
    value.with_timezone(&Utc).timestamp_millis()
}

/// Human form of a data age, used in the "Data updated ..." stamp.
pub fn display_time(age_secs: f64) -> String {
    let secs = age_secs.max(0.0).floor() as u64;
    if secs < 60 {
        plural(secs, "second")
    } else if secs < 3600 {
        plural(secs / 60, "minute")
    } else {
        plural(secs / 3600, "hour")
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

/// Minutes-until text for a predicted arrival, relative to the response
/// timestamp of the snapshot the prediction came from.
pub fn arrival_estimate(expected: &DateTime<FixedOffset>, reference_ms: i64) -> String {
    let delta_ms = epoch_ms(expected) - reference_ms;
    let minutes = (delta_ms as f64 / 60_000.0).round() as i64;
    if minutes < 1 {
        "< 1 minute".to_string()
    } else if minutes == 1 {
        "1 minute".to_string()
    } else {
        format!("{} minutes", minutes)
    }
}

/// Clock-face form of a departure time, e.g. "3:05 PM".
pub fn clock_time(value: &DateTime<FixedOffset>) -> String {
    value.format("%-I:%M %p").to_string()
}

/// Strip the agency prefix from a composite id like "MTA NYCT_401345".
pub fn strip_agency(id: &str) -> &str {
    id.split_once('_').map(|(_, rest)| rest).unwrap_or(id)
}

/// Trailing digit run of a stop id, used for deep-link fragments.
pub fn stop_code_digits(id: &str) -> &str {
    let tail = id
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    &id[tail..]
}

/// Stable hash of a destination name, used in grouping keys so two
/// directions sharing a direction id but not a headsign stay distinct.
pub fn destination_hash(name: &str) -> u32 {
    name.chars()
        .fold(0u32, |acc, c| acc.wrapping_mul(31).wrapping_add(c as u32))
}
