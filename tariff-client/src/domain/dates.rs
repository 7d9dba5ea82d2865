//! Date and timestamp parsing shared by every tabular input.

use serde::Serializer;
use time::{macros::format_description, Date, PrimitiveDateTime};

use super::DomainError;

/// Parse a calendar date in `YYYY-MM-DD` form. Anything after the tenth
/// character (a time of day, a `T00:00:00` suffix) is ignored.
pub fn parse_date(value: &str) -> Result<Date, DomainError> {
    let trimmed = value.trim();
    let day = trimmed.get(..10).unwrap_or(trimmed);
    Date::parse(day, format_description!("[year]-[month]-[day]")).map_err(|e| {
        DomainError::InvalidDate {
            value: value.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Parse an interval timestamp, `YYYY-MM-DD HH:MM[:SS]` with either a space or
/// a `T` between date and time. Fractional seconds and offsets are dropped.
pub fn parse_timestamp(value: &str) -> Result<PrimitiveDateTime, DomainError> {
    let normalized = value.trim().replacen('T', " ", 1);
    let parsed = match normalized.get(..19) {
        Some(full) => PrimitiveDateTime::parse(
            full,
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        ),
        None => PrimitiveDateTime::parse(
            &normalized,
            format_description!("[year]-[month]-[day] [hour]:[minute]"),
        ),
    };

    parsed.map_err(|e| DomainError::InvalidDate {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Serialize a `Date` as `YYYY-MM-DD` regardless of serializer format.
pub fn serialize_date<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(date)
}
