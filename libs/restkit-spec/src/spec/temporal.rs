//! Date, date-time, unix-time and duration specs plus their text formats

use super::{Direction, fail_type_check};
use crate::error::Result;
use crate::options::SerializationOptions;
use crate::path::PropertyPath;
use crate::value::Value;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

pub(super) fn date(
    direction: Direction,
    path: &PropertyPath,
    value: &Value,
    options: &SerializationOptions,
) -> Result<Value> {
    match direction {
        Direction::Serialize => match native_date_time(value).and_then(format_date) {
            Some(text) => Ok(Value::String(text)),
            None => fail_type_check(
                direction,
                path,
                value,
                "a Date object or an ISO8601 string",
                options,
            ),
        },
        Direction::Deserialize => match wire_date_time(value, parse_date_time) {
            Some(dt) => Ok(Value::DateTime(dt)),
            None => fail_type_check(direction, path, value, "an ISO8601 Date string", options),
        },
    }
}

pub(super) fn date_time(
    direction: Direction,
    path: &PropertyPath,
    value: &Value,
    options: &SerializationOptions,
) -> Result<Value> {
    match direction {
        Direction::Serialize => match native_date_time(value).and_then(format_iso8601) {
            Some(text) => Ok(Value::String(text)),
            None => fail_type_check(
                direction,
                path,
                value,
                "a Date object or an ISO8601 DateTime string",
                options,
            ),
        },
        Direction::Deserialize => match wire_date_time(value, parse_date_time) {
            Some(dt) => Ok(Value::DateTime(dt)),
            None => fail_type_check(
                direction,
                path,
                value,
                "an ISO8601 DateTime string",
                options,
            ),
        },
    }
}

pub(super) fn date_time_rfc1123(
    direction: Direction,
    path: &PropertyPath,
    value: &Value,
    options: &SerializationOptions,
) -> Result<Value> {
    match direction {
        Direction::Serialize => match native_date_time(value).and_then(format_rfc1123) {
            Some(text) => Ok(Value::String(text)),
            None => fail_type_check(
                direction,
                path,
                value,
                "a Date object or an RFC1123 DateTime string",
                options,
            ),
        },
        Direction::Deserialize => match wire_date_time(value, parse_rfc1123) {
            Some(dt) => Ok(Value::DateTime(dt)),
            None => fail_type_check(
                direction,
                path,
                value,
                "an RFC1123 DateTime string",
                options,
            ),
        },
    }
}

pub(super) fn unix_time(
    direction: Direction,
    path: &PropertyPath,
    value: &Value,
    options: &SerializationOptions,
) -> Result<Value> {
    match direction {
        // unix_timestamp() already floors: sub-second nanos are never negative
        Direction::Serialize => match native_date_time(value) {
            Some(dt) => Ok(Value::from(dt.unix_timestamp())),
            None => fail_type_check(
                direction,
                path,
                value,
                "a Date object or an ISO8601 DateTime string",
                options,
            ),
        },
        Direction::Deserialize => match value.as_i64() {
            Some(seconds) => match OffsetDateTime::from_unix_timestamp(seconds) {
                Ok(dt) => Ok(Value::DateTime(dt)),
                Err(_) => fail_type_check(direction, path, value, "a unix time number", options),
            },
            None => match value.as_f64().and_then(from_fractional_unix_seconds) {
                Some(dt) => Ok(Value::DateTime(dt)),
                None => fail_type_check(direction, path, value, "a unix time number", options),
            },
        },
    }
}

pub(super) fn time_span(
    direction: Direction,
    path: &PropertyPath,
    value: &Value,
    options: &SerializationOptions,
) -> Result<Value> {
    match (direction, value) {
        (Direction::Serialize, Value::Duration(duration)) => {
            Ok(Value::String(format_iso_duration(*duration)))
        }
        (Direction::Serialize, Value::String(text)) if parse_iso_duration(text).is_some() => {
            Ok(value.clone())
        }
        (Direction::Serialize, _) => {
            fail_type_check(direction, path, value, "a TimeSpan duration", options)
        }
        (Direction::Deserialize, Value::Duration(_)) => Ok(value.clone()),
        (Direction::Deserialize, Value::String(text)) => match parse_iso_duration(text) {
            Some(duration) => Ok(Value::Duration(duration)),
            None => fail_type_check(
                direction,
                path,
                value,
                "an ISO8601 TimeSpan string",
                options,
            ),
        },
        (Direction::Deserialize, _) => fail_type_check(
            direction,
            path,
            value,
            "an ISO8601 TimeSpan string",
            options,
        ),
    }
}

/// Native side of a date spec: a date-time, or any string a date parser accepts
fn native_date_time(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::String(text) => parse_date_time(text).or_else(|| parse_rfc1123(text)),
        _ => None,
    }
}

fn wire_date_time(
    value: &Value,
    parse: fn(&str) -> Option<OffsetDateTime>,
) -> Option<OffsetDateTime> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::String(text) => parse(text),
        _ => None,
    }
}

fn from_fractional_unix_seconds(seconds: f64) -> Option<OffsetDateTime> {
    let offset = time::Duration::checked_seconds_f64(seconds)?;
    OffsetDateTime::UNIX_EPOCH.checked_add(offset)
}

const ISO8601: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
);
const CALENDAR_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const RFC1123: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// `YYYY-MM-DDTHH:MM:SS.mmmZ`
pub(crate) fn format_iso8601(dt: OffsetDateTime) -> Option<String> {
    dt.to_offset(UtcOffset::UTC).format(ISO8601).ok()
}

/// First ten characters of the ISO-8601 form
pub(crate) fn format_date(dt: OffsetDateTime) -> Option<String> {
    dt.to_offset(UtcOffset::UTC).format(CALENDAR_DATE).ok()
}

/// `Tue, 01 Jan 2019 00:00:00 GMT`, also before 1970 where `httpdate` stops
pub(crate) fn format_rfc1123(dt: OffsetDateTime) -> Option<String> {
    dt.to_offset(UtcOffset::UTC).format(RFC1123).ok()
}

/// Lenient ISO-8601 parsing
///
/// Accepts RFC 3339 date-times, bare `YYYY-MM-DD` dates (midnight UTC) and
/// date-times without an offset (taken as UTC).
pub(crate) fn parse_date_time(text: &str) -> Option<OffsetDateTime> {
    let text = text.trim();
    if let Ok(dt) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(dt);
    }
    if let Some(date) = parse_calendar_date(text) {
        return Some(date.midnight().assume_utc());
    }
    OffsetDateTime::parse(&format!("{text}Z"), &Rfc3339).ok()
}

fn parse_calendar_date(text: &str) -> Option<time::Date> {
    time::Date::parse(text, CALENDAR_DATE).ok()
}

pub(crate) fn parse_rfc1123(text: &str) -> Option<OffsetDateTime> {
    let text = text.trim();
    if let Ok(system_time) = httpdate::parse_http_date(text) {
        return Some(OffsetDateTime::from(system_time));
    }
    OffsetDateTime::parse(text, &Rfc2822).ok()
}

/// ISO-8601 duration such as `P1DT2H3M4.5S`
pub(crate) fn format_iso_duration(duration: time::Duration) -> String {
    let mut parts: Vec<String> = Vec::new();
    if duration.is_negative() {
        parts.push("-".to_owned());
    }
    let duration = duration.abs();
    let total = duration.whole_seconds();
    let days = total.div_euclid(86_400);
    let hours = total.rem_euclid(86_400).div_euclid(3_600);
    let minutes = total.rem_euclid(3_600).div_euclid(60);
    let seconds = total.rem_euclid(60);
    let nanos = duration.subsec_nanoseconds();

    parts.push("P".to_owned());
    if days > 0 {
        parts.push(format!("{days}D"));
    }
    let has_time = hours > 0 || minutes > 0 || seconds > 0 || nanos > 0;
    if has_time || days == 0 {
        parts.push("T".to_owned());
    }
    if hours > 0 {
        parts.push(format!("{hours}H"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}M"));
    }
    if nanos > 0 {
        let fraction = format!("{nanos:09}");
        parts.push(format!("{seconds}.{}S", fraction.trim_end_matches('0')));
    } else if seconds > 0 || !has_time && days == 0 {
        parts.push(format!("{seconds}S"));
    }
    parts.concat()
}

/// Parse an ISO-8601 duration
///
/// Years and months have no fixed length; they are taken as 365 and 30 days.
pub(crate) fn parse_iso_duration(text: &str) -> Option<time::Duration> {
    let text = text.trim();
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let rest = rest.strip_prefix(['P', 'p'])?;

    let mut total = time::Duration::ZERO;
    let mut in_time = false;
    let mut seen_component = false;
    let mut number = String::new();
    for ch in rest.chars() {
        match ch {
            '0'..='9' | '.' => number.push(ch),
            ',' => number.push('.'),
            'T' | 't' => {
                if in_time || !number.is_empty() {
                    return None;
                }
                in_time = true;
            }
            designator => {
                if number.is_empty() {
                    return None;
                }
                let unit_seconds: i32 = match (in_time, designator.to_ascii_uppercase()) {
                    (false, 'Y') => 365 * 86_400,
                    (false, 'M') => 30 * 86_400,
                    (false, 'W') => 7 * 86_400,
                    (false, 'D') => 86_400,
                    (true, 'H') => 3_600,
                    (true, 'M') => 60,
                    (true, 'S') => 1,
                    _ => return None,
                };
                total = total.checked_add(component(&number, unit_seconds)?)?;
                number.clear();
                seen_component = true;
            }
        }
    }
    if !number.is_empty() || !seen_component {
        return None;
    }
    Some(if negative { -total } else { total })
}

fn component(number: &str, unit_seconds: i32) -> Option<time::Duration> {
    let unit = i64::from(unit_seconds);
    match number.split_once('.') {
        None => {
            let amount: i64 = number.parse().ok()?;
            Some(time::Duration::seconds(amount.checked_mul(unit)?))
        }
        Some((whole, fraction)) => {
            let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
            let whole = time::Duration::seconds(whole.checked_mul(unit)?);
            let fraction: f64 = format!("0.{fraction}").parse().ok()?;
            let fraction = time::Duration::checked_seconds_f64(fraction * f64::from(unit_seconds))?;
            whole.checked_add(fraction)
        }
    }
}
