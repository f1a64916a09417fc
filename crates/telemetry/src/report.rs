//! # Trip report
//!
//! Summary of one device's route over a window: how far it went, where it
//! dwelt and how long it spent moving.

use chrono::Duration;
use serde::Serialize;

use crate::distance::route_km;
use crate::range::TimeWindow;
use crate::reading::Reading;
use crate::stops::{self, StopConfig, StopEvent};

/// Derived trip analytics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripReport {
    pub device_id: String,
    pub window: TimeWindow,
    /// Number of readings in the route.
    pub points: usize,
    pub distance_km: f64,
    pub stops: Vec<StopEvent>,
    /// Highest reported speed, km/h.
    pub max_speed: f64,
}

impl TripReport {
    /// Build a report from a time-ordered route.
    #[must_use]
    pub fn build(
        device_id: &str, window: TimeWindow, route: &[Reading], stop_config: &StopConfig,
        max_segment_km: f64,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            window,
            points: route.len(),
            distance_km: route_km(route, max_segment_km),
            stops: stops::detect_in_route(route, stop_config),
            max_speed: route.iter().map(|r| r.speed).fold(0.0, f64::max),
        }
    }

    /// Total time spent in stops.
    #[must_use]
    pub fn stopped_for(&self) -> Duration {
        self.stops.iter().map(StopEvent::duration).fold(Duration::zero(), |acc, d| acc + d)
    }
}
