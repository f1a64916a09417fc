//! # Timestamp Resolver
//!
//! Device firmware revisions and API versions encode the reading time in
//! different ways. The resolver tries every known encoding in a fixed order
//! and never fails: a record with no usable time is stamped with "now".
//!
//! ISO values without an offset are wall-clock times in the caller's zone.
//! The compact and split encodings are always UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::fields::{is_digits, starts_with_iso_date, text};

/// Encodings recognised by the resolver, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// `dateTime`: `YYYY-MM-DDTHH:MM[:SS[.fff]][Z|±HH[:MM]]`.
    Iso,
    /// `dateTime`: `YYMMDDTHHMMSSZ`.
    Compact,
    /// `date`: `YYMMDD` plus `time`: `HHMMSS`.
    SplitDateTime,
    /// `data.f`: `YYYY-MM-DD` plus `data.h`: `HHMMSS`.
    DataBlock,
}

const ENCODINGS: [Encoding; 4] =
    [Encoding::Iso, Encoding::Compact, Encoding::SplitDateTime, Encoding::DataBlock];

/// Resolve the instant of a raw record, falling back to the current time.
/// ISO values without an offset are read in `tz`.
#[must_use]
pub fn resolve(raw: &Value, tz: Tz) -> DateTime<Utc> {
    resolve_opt(raw, tz).map_or_else(Utc::now, |(ts, _)| ts)
}

/// Resolve the instant of a raw record along with the encoding that produced
/// it. Returns `None` when no encoding matches.
#[must_use]
pub fn resolve_opt(raw: &Value, tz: Tz) -> Option<(DateTime<Utc>, Encoding)> {
    ENCODINGS.iter().find_map(|&encoding| decode(raw, encoding, tz).map(|ts| (ts, encoding)))
}

fn decode(raw: &Value, encoding: Encoding, tz: Tz) -> Option<DateTime<Utc>> {
    match encoding {
        Encoding::Iso => {
            let value = text(raw, &["dateTime"])?;
            if !starts_with_iso_date(value) || value.as_bytes().get(10) != Some(&b'T') {
                return None;
            }
            parse_iso(value, tz)
        }
        Encoding::Compact => {
            let value = text(raw, &["dateTime"])?;
            let (date, rest) = value.split_once('T')?;
            let time = rest.strip_suffix('Z')?;
            two_digit_year(date, time)
        }
        Encoding::SplitDateTime => {
            two_digit_year(text(raw, &["date"])?, text(raw, &["time"])?)
        }
        Encoding::DataBlock => {
            let date = text(raw, &["data", "f"])?;
            let time = text(raw, &["data", "h"])?;
            if date.len() != 10 || !starts_with_iso_date(date) {
                return None;
            }
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
            Some(date.and_time(hhmmss(time)?).and_utc())
        }
    }
}

fn parse_iso(value: &str, tz: Tz) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let offset = ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M%#z"]
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(value, fmt).ok());
    if let Some(dt) = offset {
        return Some(dt.with_timezone(&Utc));
    }

    // no offset: wall-clock time in `tz`
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())?;
    tz.from_local_datetime(&naive).earliest().map(|dt| dt.with_timezone(&Utc))
}

// `YYMMDD` + `HHMMSS`, years offset from 2000.
fn two_digit_year(date: &str, time: &str) -> Option<DateTime<Utc>> {
    if !is_digits(date, 6) {
        return None;
    }
    let year = 2000 + date[0..2].parse::<i32>().ok()?;
    let month = date[2..4].parse::<u32>().ok()?;
    let day = date[4..6].parse::<u32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.and_time(hhmmss(time)?).and_utc())
}

fn hhmmss(time: &str) -> Option<NaiveTime> {
    if !is_digits(time, 6) {
        return None;
    }
    let hour = time[0..2].parse::<u32>().ok()?;
    let minute = time[2..4].parse::<u32>().ok()?;
    let second = time[4..6].parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hour, minute, second)
}
