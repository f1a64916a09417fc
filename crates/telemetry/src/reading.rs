//! # Reading Normalizer
//!
//! The upstream schema renamed fields across API versions and never retired
//! the old names. Each attribute therefore has an ordered alias table of
//! `(field path, transform)` candidates; the first candidate that is present
//! *and* transforms successfully wins. New upstream variants are added to the
//! tables, not to the control flow.
//!
//! "Last known position" and "historical item" records share the same inner
//! `data` block, so one normalizer serves both.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coordinate::{self, Coordinate};
use crate::event::EventCode;
use crate::fields::{lookup, number, scalar_text};
use crate::timestamp;

/// A normalized telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Device the sample belongs to.
    pub device_id: String,

    /// Instant of the sample. Records without a decodable time carry the
    /// time they were normalized at.
    pub timestamp: DateTime<Utc>,

    /// Position, absent when the record had no usable coordinates.
    pub position: Option<Coordinate>,

    /// Speed in km/h, never negative.
    pub speed: f64,

    pub event_code: EventCode,

    /// Signal quality, passed through as reported.
    pub signal: Option<String>,

    /// Battery voltage.
    pub battery: Option<f64>,

    /// The record this reading was built from.
    pub raw: Value,
}

/// One entry of an alias table.
struct Candidate<T> {
    path: &'static [&'static str],
    transform: fn(&Value) -> Option<T>,
}

const DEVICE_ID: &[Candidate<String>] = &[
    Candidate { path: &["deviceId"], transform: device_id },
    Candidate { path: &["id"], transform: device_id },
];

const SPEED: &[Candidate<f64>] = &[Candidate { path: &["data", "v"], transform: speed }];

const EVENT_CODE: &[Candidate<EventCode>] = &[
    Candidate { path: &["data", "ev"], transform: event_code },
    Candidate { path: &["data", "e"], transform: event_code },
];

const SIGNAL: &[Candidate<String>] = &[
    Candidate { path: &["data", "sg"], transform: scalar_text },
    Candidate { path: &["data", "q"], transform: scalar_text },
    Candidate { path: &["data", "signal"], transform: scalar_text },
];

const BATTERY: &[Candidate<f64>] = &[
    Candidate { path: &["data", "Bt"], transform: battery },
    Candidate { path: &["data", "b"], transform: battery },
    Candidate { path: &["data", "bt"], transform: battery },
];

fn first<T>(raw: &Value, candidates: &[Candidate<T>]) -> Option<T> {
    candidates.iter().find_map(|c| lookup(raw, c.path).and_then(c.transform))
}

impl Reading {
    /// Normalize a raw upstream record, reading times without an offset as
    /// UTC.
    ///
    /// Never fails: undecodable fields fall back to "now", no position, zero
    /// speed or no value. A record without a device id gets an empty one; use
    /// [`Reading::normalize_for`] when the device is known from the request.
    #[must_use]
    pub fn normalize(raw: &Value) -> Self {
        Self::normalize_in(raw, Tz::UTC)
    }

    /// Normalize a raw upstream record, reading times without an offset in
    /// `tz`.
    #[must_use]
    pub fn normalize_in(raw: &Value, tz: Tz) -> Self {
        let speed = first(raw, SPEED).unwrap_or(0.0);

        Self {
            device_id: first(raw, DEVICE_ID).unwrap_or_default(),
            timestamp: timestamp::resolve(raw, tz),
            position: coordinate::resolve(raw),
            speed,
            event_code: first(raw, EVENT_CODE).unwrap_or_else(|| EventCode::from_speed(speed)),
            signal: first(raw, SIGNAL),
            battery: first(raw, BATTERY),
            raw: raw.clone(),
        }
    }

    /// Normalize a record fetched for `device_id`, using that id when the
    /// record does not name its device.
    #[must_use]
    pub fn normalize_for(device_id: &str, raw: &Value, tz: Tz) -> Self {
        let mut reading = Self::normalize_in(raw, tz);
        if reading.device_id.is_empty() {
            reading.device_id = device_id.to_string();
        }
        reading
    }

    #[must_use]
    pub fn latitude(&self) -> Option<f64> {
        self.position.map(|p| p.lat)
    }

    #[must_use]
    pub fn longitude(&self) -> Option<f64> {
        self.position.map(|p| p.lon)
    }
}

fn device_id(value: &Value) -> Option<String> {
    scalar_text(value).map(|id| id.trim().to_string()).filter(|id| !id.is_empty())
}

fn speed(value: &Value) -> Option<f64> {
    number(value).map(|v| v.max(0.0))
}

#[allow(clippy::cast_possible_truncation)]
fn event_code(value: &Value) -> Option<EventCode> {
    let code = number(value)?;
    (code.fract() == 0.0).then_some(EventCode(code as i64))
}

// Accepts numbers and strings such as "12,4 V".
fn battery(value: &Value) -> Option<f64> {
    match value {
        Value::Number(_) => number(value),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .replacen(',', ".", 1)
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
                .collect();
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}
