//! # CSV import and export
//!
//! Routes are exported with one row per reading, every field quoted, dates
//! and times in the configured zone. Import accepts those files as well as
//! the Spanish-headed exports of the older dashboard.

use std::io::{Read, Write};

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};
use telemetry::event::fold;
use telemetry::{Coordinate, EventCode, Reading, TimeWindow};
use tracing::warn;

const HEADER: [&str; 7] =
    ["Latitude", "Longitude", "Date", "Time", "Speed (km/h)", "Event", "Signal"];
const ADDRESS: &str = "Address";

/// Columns understood on import, by folded header prefix.
const LATITUDE: &[&str] = &["latitude", "latitud", "lat"];
const LONGITUDE: &[&str] = &["longitude", "longitud", "lon", "lng"];
const DATE: &[&str] = &["date", "fecha"];
const TIME: &[&str] = &["time", "hora"];
const SPEED: &[&str] = &["speed", "velocidad"];
const EVENT: &[&str] = &["event", "evento"];
const SIGNAL: &[&str] = &["signal", "senal"];

/// File name of an exported route, e.g.
/// `route_7_2025-10-17_090000__2025-10-17_110000.csv`.
#[must_use]
pub fn file_name(device_id: &str, window: &TimeWindow, tz: Tz) -> String {
    let stamp = |ts: chrono::DateTime<Utc>| ts.with_timezone(&tz).format("%Y-%m-%d_%H%M%S");
    format!("route_{device_id}_{}__{}.csv", stamp(window.start()), stamp(window.end()))
}

/// Write `readings` as CSV. When `addresses` is given it must be aligned
/// with `readings` and adds an address column.
///
/// # Errors
///
/// Returns an error when the addresses are not aligned or writing fails.
pub fn export<W: Write>(
    writer: W, readings: &[Reading], addresses: Option<&[String]>, tz: Tz,
) -> Result<()> {
    if let Some(addresses) = addresses
        && addresses.len() != readings.len()
    {
        return Err(anyhow!(
            "{} addresses for {} readings",
            addresses.len(),
            readings.len()
        ));
    }

    let mut csv =
        csv::WriterBuilder::new().quote_style(csv::QuoteStyle::Always).from_writer(writer);

    let mut header = HEADER.to_vec();
    if addresses.is_some() {
        header.push(ADDRESS);
    }
    csv.write_record(&header).context("writing CSV header")?;

    for (i, reading) in readings.iter().enumerate() {
        let local = reading.timestamp.with_timezone(&tz);
        let mut row = vec![
            reading.latitude().map(|v| v.to_string()).unwrap_or_default(),
            reading.longitude().map(|v| v.to_string()).unwrap_or_default(),
            local.format("%Y-%m-%d").to_string(),
            local.format("%H:%M:%S").to_string(),
            reading.speed.to_string(),
            reading.event_code.label(),
            reading.signal.clone().unwrap_or_default(),
        ];
        if let Some(address) = addresses.and_then(|a| a.get(i)) {
            row.push(address.clone());
        }
        csv.write_record(&row).context("writing CSV row")?;
    }

    csv.flush().context("flushing CSV")?;
    Ok(())
}

/// Column positions resolved from a header row.
#[derive(Debug)]
struct Columns {
    latitude: Option<usize>,
    longitude: Option<usize>,
    date: Option<usize>,
    time: Option<usize>,
    speed: Option<usize>,
    event: Option<usize>,
    signal: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let folded: Vec<String> = headers.iter().map(|h| fold(h.trim())).collect();
        let find = |names: &[&str]| {
            names.iter().find_map(|name| folded.iter().position(|h| h.starts_with(name)))
        };

        let columns = Self {
            latitude: find(LATITUDE),
            longitude: find(LONGITUDE),
            date: find(DATE),
            time: find(TIME),
            speed: find(SPEED),
            event: find(EVENT),
            signal: find(SIGNAL),
        };
        if columns.date.is_none() || columns.time.is_none() {
            return Err(anyhow!("CSV has no date and time columns"));
        }
        Ok(columns)
    }
}

/// Read readings for `device_id` from a CSV export. Dates and times are read
/// in `tz`. Rows without a usable date and time are skipped; the result is
/// sorted by timestamp.
///
/// # Errors
///
/// Returns an error when the file cannot be read or lacks date and time
/// columns.
pub fn import<R: Read>(reader: R, device_id: &str, tz: Tz) -> Result<Vec<Reading>> {
    let mut csv =
        csv::ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(reader);
    let headers = csv.headers().context("reading CSV header")?.clone();
    let columns = Columns::resolve(&headers)?;

    let mut readings = Vec::new();
    let mut skipped = 0_usize;

    for (line, record) in csv.records().enumerate() {
        let record = record.with_context(|| format!("reading CSV row {}", line + 1))?;
        match row_to_reading(&headers, &record, &columns, device_id, tz) {
            Some(reading) => readings.push(reading),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(device_id, skipped, "skipped CSV rows without a usable date and time");
    }
    readings.sort_by_key(|r| r.timestamp);
    Ok(readings)
}

fn row_to_reading(
    headers: &csv::StringRecord, record: &csv::StringRecord, columns: &Columns, device_id: &str,
    tz: Tz,
) -> Option<Reading> {
    let field =
        |column: Option<usize>| column.and_then(|i| record.get(i)).filter(|v| !v.is_empty());
    let number = |column| field(column).and_then(|v| v.replace(',', ".").parse::<f64>().ok());

    let date = NaiveDate::parse_from_str(field(columns.date)?, "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(field(columns.time)?, "%H:%M:%S").ok()?;
    let timestamp = tz.from_local_datetime(&date.and_time(time)).earliest()?.with_timezone(&Utc);

    let position = number(columns.latitude)
        .zip(number(columns.longitude))
        .and_then(|(lat, lon)| Coordinate::new(lat, lon));
    let speed = number(columns.speed).map_or(0.0, |v| v.max(0.0));
    let event_code =
        field(columns.event).map_or_else(|| EventCode::from_speed(speed), EventCode::from_label);

    let raw: Map<String, Value> = headers
        .iter()
        .zip(record.iter())
        .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
        .collect();

    Some(Reading {
        device_id: device_id.to_string(),
        timestamp,
        position,
        speed,
        event_code,
        signal: field(columns.signal).map(ToString::to_string),
        battery: None,
        raw: Value::Object(raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_headers() {
        let headers = csv::StringRecord::from(vec![
            "Latitud",
            "Longitud",
            "Fecha",
            "Hora",
            "Velocidad (km/h)",
            "Evento",
            "Señal 4G",
            "Dirección",
        ]);
        let columns = Columns::resolve(&headers).unwrap();

        assert_eq!(columns.latitude, Some(0));
        assert_eq!(columns.longitude, Some(1));
        assert_eq!(columns.speed, Some(4));
        assert_eq!(columns.event, Some(5));
        assert_eq!(columns.signal, Some(6));
    }

    #[test]
    fn missing_time_column() {
        let headers = csv::StringRecord::from(vec!["lat", "lon", "date"]);
        Columns::resolve(&headers).unwrap_err();
    }
}
