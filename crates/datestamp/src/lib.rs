//! Compact timestamp tokens with calendar-unit differences
//!
//! Encodes an instant plus its timezone-hour offset into a token like
//! `1329842436829+1` (epoch milliseconds, then signed offset hours) and
//! computes day/month/year differences between instants using calendar
//! arithmetic rather than fixed-length windows.

use chrono::{DateTime, Datelike, FixedOffset, Local, TimeZone, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Calendar units supported by [`difference`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Day,
    Month,
    Year,
}

impl Unit {
    /// Map a duration-spec letter (`D`, `M`, `Y`) to its unit
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'D' => Some(Unit::Day),
            'M' => Some(Unit::Month),
            'Y' => Some(Unit::Year),
            _ => None,
        }
    }

    /// The duration-spec letter for this unit
    pub fn letter(&self) -> char {
        match self {
            Unit::Day => 'D',
            Unit::Month => 'M',
            Unit::Year => 'Y',
        }
    }
}

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)(?:([+-])([0-9]+))?$").unwrap());

/// Encode an instant as `<epochMillis><+|-><tzOffsetHours>`
pub fn encode(time: &DateTime<FixedOffset>) -> String {
    let millis = time.timestamp_millis();
    let tz_hours = time.offset().local_minus_utc() / 3600;
    if tz_hours >= 0 {
        format!("{}+{}", millis, tz_hours)
    } else {
        format!("{}{}", millis, tz_hours)
    }
}

/// Encode the current instant using the local timezone offset
pub fn encode_now() -> String {
    encode(&Local::now().fixed_offset())
}

/// Decode a token back into an instant carrying its encoded offset.
///
/// A bare millis token (no offset suffix) decodes as UTC. Returns `None`
/// for anything that does not parse.
pub fn decode(token: &str) -> Option<DateTime<FixedOffset>> {
    let caps = TOKEN_RE.captures(token)?;
    let millis: i64 = caps[1].parse().ok()?;
    let tz_hours: i32 = match (caps.get(2), caps.get(3)) {
        (Some(sign), Some(hours)) => {
            let hours: i32 = hours.as_str().parse().ok()?;
            if sign.as_str() == "-" {
                -hours
            } else {
                hours
            }
        }
        _ => 0,
    };
    let offset = FixedOffset::east_opt(tz_hours * 3600)?;
    let instant = Utc.timestamp_millis_opt(millis).single()?;
    Some(instant.with_timezone(&offset))
}

/// Calendar difference between two instants, rounded to whole units.
///
/// Years and months compare wall-clock calendar fields (each instant in
/// its own offset), so a month difference reflects variable month
/// lengths. Days divide the millisecond delta by 86,400,000 and round to
/// the nearest integer, which absorbs DST shifts.
pub fn difference(from: &DateTime<FixedOffset>, to: &DateTime<FixedOffset>, unit: Unit) -> i64 {
    match unit {
        Unit::Year => i64::from(to.year() - from.year()),
        Unit::Month => {
            let year_diff = i64::from(to.year() - from.year());
            i64::from(to.month0() as i32 - from.month0() as i32) + year_diff * 12
        }
        Unit::Day => {
            let millis = to.timestamp_millis() - from.timestamp_millis();
            (millis as f64 / 86_400_000.0).round() as i64
        }
    }
}
