//! # Stop Detector
//!
//! A stationary vehicle keeps reporting slightly different positions. The
//! detector folds consecutive readings that stay within a small radius of
//! the running centroid into one cluster and reports the clusters that are
//! both dense and long enough to be a real stop rather than a red light.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::distance::haversine_m;
use crate::reading::Reading;

/// Clustering thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopConfig {
    /// Maximum distance from the running centroid, in meters.
    pub radius_m: f64,
    pub min_points: usize,
    pub min_duration: Duration,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self { radius_m: 10.0, min_points: 3, min_duration: Duration::minutes(5) }
    }
}

/// A dwell interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopEvent {
    pub center: Coordinate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl StopEvent {
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

struct Cluster {
    sum_lat: f64,
    sum_lon: f64,
    count: usize,
    center: Coordinate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Cluster {
    fn seed(position: Coordinate, ts: DateTime<Utc>) -> Self {
        Self {
            sum_lat: position.lat,
            sum_lon: position.lon,
            count: 1,
            center: position,
            start: ts,
            end: ts,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn fold(&mut self, position: Coordinate, ts: DateTime<Utc>) {
        self.count += 1;
        self.sum_lat += position.lat;
        self.sum_lon += position.lon;
        self.center = Coordinate {
            lat: self.sum_lat / self.count as f64,
            lon: self.sum_lon / self.count as f64,
        };
        self.end = ts;
    }

    fn close(self, config: &StopConfig) -> Option<StopEvent> {
        (self.count >= config.min_points && self.end - self.start >= config.min_duration)
            .then_some(StopEvent { center: self.center, start: self.start, end: self.end })
    }
}

/// Detect stops in a time-ordered sequence of `(position, timestamp)` points.
#[must_use]
pub fn detect(
    points: impl IntoIterator<Item = (Coordinate, DateTime<Utc>)>, config: &StopConfig,
) -> Vec<StopEvent> {
    let mut stops = Vec::new();
    let mut cluster: Option<Cluster> = None;

    for (position, ts) in points {
        let within = |open: &&mut Cluster| haversine_m(position, open.center) <= config.radius_m;
        if let Some(open) = cluster.as_mut().filter(within) {
            open.fold(position, ts);
            continue;
        }

        if let Some(stop) = cluster.take().and_then(|c| c.close(config)) {
            stops.push(stop);
        }
        cluster = Some(Cluster::seed(position, ts));
    }

    if let Some(stop) = cluster.and_then(|c| c.close(config)) {
        stops.push(stop);
    }

    stops
}

/// Detect stops along a route. Readings without a position are skipped.
#[must_use]
pub fn detect_in_route(readings: &[Reading], config: &StopConfig) -> Vec<StopEvent> {
    detect(readings.iter().filter_map(|r| r.position.map(|p| (p, r.timestamp))), config)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    // about 1 m of latitude
    const METER: f64 = 1.0 / 111_195.0;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 17, 12, 0, 0).unwrap()
    }

    fn jitter(n: u32, spacing: Duration) -> Vec<(Coordinate, DateTime<Utc>)> {
        (0..n)
            .map(|i| {
                let offset = f64::from(i % 5) * METER;
                let position = Coordinate { lat: -26.8 + offset, lon: -65.2 };
                (position, start() + spacing * i32::try_from(i).unwrap())
            })
            .collect()
    }

    #[test]
    fn dense_long_cluster_is_a_stop() {
        // 10 points within 5 m over 10 minutes
        let points = jitter(10, Duration::seconds(66) + Duration::milliseconds(667));
        let stops = detect(points, &StopConfig::default());

        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].start, start());
        assert!(stops[0].duration() >= Duration::minutes(10));
        assert!(haversine_m(stops[0].center, Coordinate { lat: -26.8, lon: -65.2 }) < 5.0);
    }

    #[test]
    fn too_few_points() {
        let points = jitter(2, Duration::minutes(10));
        assert!(detect(points, &StopConfig::default()).is_empty());
    }

    #[test]
    fn too_short() {
        // 10 points over 1 minute
        let points = jitter(10, Duration::seconds(6) + Duration::milliseconds(667));
        assert!(detect(points, &StopConfig::default()).is_empty());
    }

    #[test]
    fn movement_splits_clusters() {
        let mut points = jitter(6, Duration::minutes(1));
        // drive 1 km north, then park again
        let later = start() + Duration::minutes(30);
        for i in 0..6 {
            let position = Coordinate { lat: -26.8 + 1_000.0 * METER, lon: -65.2 };
            points.push((position, later + Duration::minutes(i)));
        }

        let stops = detect(points, &StopConfig::default());
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[1].start, later);
        assert_eq!(stops[1].end, later + Duration::minutes(5));
    }

    #[test]
    fn empty_input() {
        assert!(detect(Vec::new(), &StopConfig::default()).is_empty());
    }
}
