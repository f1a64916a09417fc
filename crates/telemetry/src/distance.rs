//! # Distance Accumulator

use crate::coordinate::Coordinate;
use crate::reading::Reading;

const EARTH_RADIUS_M: f64 = 6_371_000.0; // unit: meter
const EARTH_RADIUS_KM: f64 = 6_371.0; // unit: kilometer

/// Segments at least this long are treated as GPS glitches.
pub const MAX_SEGMENT_KM: f64 = 5.0;

/// Great-circle distance between two positions, in meters.
#[must_use]
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    haversine(a, b, EARTH_RADIUS_M)
}

/// Great-circle distance between two positions, in kilometers.
#[must_use]
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    haversine(a, b, EARTH_RADIUS_KM)
}

fn haversine(a: Coordinate, b: Coordinate, radius: f64) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * radius * h.sqrt().min(1.0).asin()
}

/// Total travelled distance in kilometers over an ordered sequence of
/// positions, skipping segments of [`MAX_SEGMENT_KM`] or more.
#[must_use]
pub fn total_km(points: &[Coordinate]) -> f64 {
    total_km_with(points.iter().copied().map(Some), MAX_SEGMENT_KM)
}

/// Total travelled distance of a route. Segments touching a reading without
/// a position contribute nothing.
#[must_use]
pub fn route_km(readings: &[Reading], max_segment_km: f64) -> f64 {
    total_km_with(readings.iter().map(|r| r.position), max_segment_km)
}

fn total_km_with(points: impl IntoIterator<Item = Option<Coordinate>>, max_segment_km: f64) -> f64 {
    let mut total = 0.0;
    let mut previous: Option<Option<Coordinate>> = None;

    for current in points {
        if let Some((Some(a), Some(b))) = previous.map(|p| (p, current)) {
            let segment = haversine_km(a, b);
            if segment < max_segment_km {
                total += segment;
            } else {
                tracing::debug!(segment_km = segment, "discarding GPS jump");
            }
        }
        previous = Some(current);
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    // One kilometer of latitude at the mean Earth radius.
    const KM_LAT: f64 = 1.0 / 111.194_926_644_558_73;

    fn at(lat: f64, lon: f64) -> Coordinate {
        Coordinate { lat, lon }
    }

    #[test]
    fn known_distance() {
        let d = haversine_km(at(0.0, 0.0), at(1.0, 0.0));
        assert!((d - 111.194_9).abs() < 1e-3, "got {d}");
        assert!((haversine_m(at(0.0, 0.0), at(1.0, 0.0)) - d * 1_000.0).abs() < 1e-6);
    }

    #[test]
    fn collinear_points() {
        let points = [at(0.0, 0.0), at(KM_LAT, 0.0), at(2.0 * KM_LAT, 0.0)];
        let total = total_km(&points);
        assert!((total - 2.0).abs() < 1e-6, "got {total}");
    }

    #[test]
    fn jump_is_discarded() {
        // 50 km detour between two legitimate 1 km legs
        let points = [
            at(0.0, 0.0),
            at(KM_LAT, 0.0),
            at(50.0 * KM_LAT, 0.0),
            at(2.0 * KM_LAT, 0.0),
            at(3.0 * KM_LAT, 0.0),
        ];
        let total = total_km(&points);
        assert!((total - 2.0).abs() < 1e-6, "got {total}");
    }

    #[test]
    fn degenerate_inputs() {
        assert!(total_km(&[]).abs() < f64::EPSILON);
        assert!(total_km(&[at(-26.8, -65.2)]).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_positions_break_segments() {
        let total =
            total_km_with([Some(at(0.0, 0.0)), None, Some(at(KM_LAT, 0.0))], MAX_SEGMENT_KM);
        assert!(total.abs() < f64::EPSILON);
    }
}
