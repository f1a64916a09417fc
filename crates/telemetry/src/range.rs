//! # Range Fetcher
//!
//! Historical readings for a device over a time window. The API's date filter
//! works on whole local days and is not always reliable, so the fetcher first
//! tries the filtered query and, when that yields nothing usable, scans the
//! unfiltered readings page by page and filters locally.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, DEFAULT_TOPIC, Page, ReadingsQuery};
use crate::provider::HttpRequest;
use crate::reading::Reading;
use crate::{Error, Result};

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// # Errors
    ///
    /// Returns [`Error::InvalidWindow`] when `end` is before `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidWindow(format!("end {end} is before start {start}")));
        }
        Ok(Self { start, end })
    }

    /// Window between two wall-clock times in `tz`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWindow`] when a time does not exist in `tz`
    /// (skipped by a DST change) or `end` is before `start`.
    pub fn from_local(start: NaiveDateTime, end: NaiveDateTime, tz: Tz) -> Result<Self> {
        let resolve = |local: NaiveDateTime| {
            tz.from_local_datetime(&local)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| Error::InvalidWindow(format!("{local} does not exist in {tz}")))
        };
        Self::new(resolve(start)?, resolve(end)?)
    }

    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    /// Local calendar days covering the window: the day of `start` and the
    /// day after the day of `end` (exclusive).
    #[must_use]
    pub fn day_range(&self, tz: Tz) -> (NaiveDate, NaiveDate) {
        let from = self.start.with_timezone(&tz).date_naive();
        let to = self.end.with_timezone(&tz).date_naive();
        (from, to.succ_opt().unwrap_or(NaiveDate::MAX))
    }
}

/// Paging and filtering options of a range fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeOptions {
    /// Page requested by the filtered query.
    pub page: u32,
    pub limit: u32,
    /// Upper bound on requests made by the fallback scan.
    pub max_pages: u32,
    pub topic: String,
    /// Zone the day boundaries of the filtered query are computed in.
    pub timezone: Tz,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self { page: 1, limit: 200, max_pages: 10, topic: DEFAULT_TOPIC.into(), timezone: Tz::UTC }
    }
}

/// Outcome of the filtered query.
enum Attempt {
    Ready(Vec<Reading>),
    Retry(String),
}

/// Fetch the readings of `device_id` inside `window`, sorted by timestamp.
///
/// # Errors
///
/// Returns the error of the first fallback page when the filtered query was
/// unusable and the scan cannot start. Failures on later pages end the scan
/// with the readings gathered so far.
pub async fn fetch_range<P: HttpRequest>(
    client: &ApiClient<P>, device_id: &str, window: &TimeWindow, options: &RangeOptions,
) -> Result<Vec<Reading>> {
    let readings = match filtered(client, device_id, window, options).await {
        Attempt::Ready(readings) => readings,
        Attempt::Retry(reason) => {
            info!(device_id, reason = %reason, "filtered query unusable, scanning pages");
            scan(client, device_id, window, options).await?
        }
    };

    let readings = sort_unique(readings);
    debug!(device_id, monotonic_counter.readings_fetched = readings.len(), "range fetched");
    Ok(readings)
}

async fn filtered<P: HttpRequest>(
    client: &ApiClient<P>, device_id: &str, window: &TimeWindow, options: &RangeOptions,
) -> Attempt {
    let (date_from, date_to) = window.day_range(options.timezone);
    let query = ReadingsQuery {
        date_from: Some(date_from),
        date_to: Some(date_to),
        page: options.page,
        limit: options.limit,
        topic: options.topic.clone(),
    };

    let page = match client.readings_page(device_id, &query).await {
        Ok(page) => page,
        Err(err) => return Attempt::Retry(err.to_string()),
    };
    if page.is_empty() {
        return Attempt::Retry("no items".to_string());
    }
    if page.has_next() == Some(true) {
        warn!(device_id, page = options.page, "filtered query has more pages than the one used");
    }

    let readings = normalize_page(device_id, &page, options.timezone);
    let outside_days = readings
        .iter()
        .map(|r| r.timestamp.with_timezone(&options.timezone).date_naive())
        .filter(|day| *day < date_from || *day >= date_to)
        .count();
    if outside_days > 0 {
        warn!(device_id, outside_days, %date_from, %date_to, "filtered query returned items outside the requested days");
    }

    let in_window: Vec<Reading> =
        readings.into_iter().filter(|r| window.contains(r.timestamp)).collect();
    if in_window.is_empty() {
        warn!(device_id, items = page.len(), "filtered page has no items inside the window");
    }

    Attempt::Ready(in_window)
}

async fn scan<P: HttpRequest>(
    client: &ApiClient<P>, device_id: &str, window: &TimeWindow, options: &RangeOptions,
) -> Result<Vec<Reading>> {
    let mut readings = Vec::new();
    let mut query = ReadingsQuery {
        page: 1,
        limit: options.limit,
        topic: options.topic.clone(),
        ..ReadingsQuery::default()
    };

    for requested in 0..options.max_pages {
        let page = match client.readings_page(device_id, &query).await {
            Ok(page) => page,
            Err(err) if requested == 0 => return Err(err),
            Err(err) => {
                warn!(device_id, page = query.page, error = %err, "page scan interrupted, keeping partial results");
                break;
            }
        };
        if page.is_empty() {
            break;
        }

        readings.extend(
            normalize_page(device_id, &page, options.timezone)
                .into_iter()
                .filter(|r| window.contains(r.timestamp)),
        );

        if page.has_next() == Some(false) {
            break;
        }
        if requested + 1 == options.max_pages {
            debug!(device_id, max_pages = options.max_pages, "page scan stopped at the page limit");
        }
        query.page += 1;
    }

    Ok(readings)
}

fn normalize_page(device_id: &str, page: &Page, tz: Tz) -> Vec<Reading> {
    page.items.iter().map(|raw| Reading::normalize_for(device_id, raw, tz)).collect()
}

// Stable sort, then drop exact repeats of a record at the same instant.
fn sort_unique(mut readings: Vec<Reading>) -> Vec<Reading> {
    readings.sort_by_key(|r| r.timestamp);

    let mut unique: Vec<Reading> = Vec::with_capacity(readings.len());
    for reading in readings {
        let repeated = unique
            .iter()
            .rev()
            .take_while(|u| u.timestamp == reading.timestamp)
            .any(|u| u.raw == reading.raw);
        if !repeated {
            unique.push(reading);
        }
    }
    unique
}
