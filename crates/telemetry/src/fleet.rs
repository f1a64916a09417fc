//! # Fleet status
//!
//! Classifies the most recent reading of every device into the buckets shown
//! on the fleet summary.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::api::ApiClient;
use crate::event::VehicleState;
use crate::provider::HttpRequest;
use crate::reading::Reading;

/// Age after which a device counts as not reporting.
pub const STALE_AFTER_HOURS: i64 = 5;

/// Status of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    InTransit,
    Stopped,
    /// Last reading is older than the stale threshold.
    Stale,
    /// Fresh, but neither moving nor stopped (panic, power events, unknown).
    Other,
}

/// Classify a last reading. Staleness takes precedence over the event code.
#[must_use]
pub fn classify(reading: &Reading, now: DateTime<Utc>, stale_after: Duration) -> DeviceStatus {
    if now - reading.timestamp >= stale_after {
        return DeviceStatus::Stale;
    }
    match reading.event_code.state() {
        VehicleState::InTransit => DeviceStatus::InTransit,
        state if state.is_stationary() => DeviceStatus::Stopped,
        _ => DeviceStatus::Other,
    }
}

/// Device ids grouped by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FleetStatus {
    /// Distinct devices asked for.
    pub total: usize,
    pub in_transit: Vec<String>,
    pub stopped: Vec<String>,
    pub stale: Vec<String>,
    pub other: Vec<String>,
    /// Devices without a last reading.
    pub unreported: Vec<String>,
}

impl FleetStatus {
    /// Summarize `readings` for the fleet `device_ids`. Ids are trimmed and
    /// counted once; readings of devices outside the fleet are ignored.
    #[must_use]
    pub fn summarize(
        device_ids: &[String], readings: &[Reading], now: DateTime<Utc>, stale_after: Duration,
    ) -> Self {
        let ids: BTreeSet<&str> = device_ids.iter().map(|id| id.trim()).collect();
        let mut status = Self { total: ids.len(), ..Self::default() };

        for id in ids {
            let Some(reading) = readings.iter().find(|r| r.device_id == id) else {
                status.unreported.push(id.to_string());
                continue;
            };
            let bucket = match classify(reading, now, stale_after) {
                DeviceStatus::InTransit => &mut status.in_transit,
                DeviceStatus::Stopped => &mut status.stopped,
                DeviceStatus::Stale => &mut status.stale,
                DeviceStatus::Other => &mut status.other,
            };
            bucket.push(id.to_string());
        }

        status
    }
}

/// Fetch the last reading of every device. One bulk request covers the fleet;
/// devices it fails or leaves out are then fetched one by one, concurrently.
/// Devices whose request fails are logged and left out.
pub async fn snapshot<P: HttpRequest>(client: &ApiClient<P>, device_ids: &[String]) -> Vec<Reading> {
    let ids: Vec<String> = device_ids
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut readings: Vec<Reading> = match client.last_readings(&ids).await {
        Ok(bulk) => bulk.into_iter().filter(|r| ids.contains(&r.device_id)).collect(),
        Err(err) => {
            warn!(devices = ids.len(), error = %err, "bulk last reading failed, fetching per device");
            Vec::new()
        }
    };

    let missing: Vec<&String> =
        ids.iter().filter(|id| !readings.iter().any(|r| &r.device_id == *id)).collect();
    let requests = missing.iter().map(|id| async move {
        match client.last_reading(id).await {
            Ok(reading) => Some(reading),
            Err(err) => {
                error!(device_id = %id, error = %err, "failed to fetch last reading");
                None
            }
        }
    });
    readings.extend(join_all(requests).await.into_iter().flatten());

    info!(
        requested = ids.len(),
        individually = missing.len(),
        monotonic_counter.last_readings = readings.len(),
        "fleet snapshot"
    );
    readings
}
