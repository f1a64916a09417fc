//! # Coordinate Resolver
//!
//! Locations arrive either as a GeoJSON point (`location.coordinates`,
//! longitude first) or as the scalar `data.la` / `data.lo` pair used by newer
//! frames. GeoJSON wins when both are present.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fields::{lookup, number};

/// A WGS84 position in decimal degrees. Both components are always finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// Build a coordinate when both components are finite.
    #[must_use]
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        (lat.is_finite() && lon.is_finite()).then_some(Self { lat, lon })
    }
}

/// Resolve the position of a raw record.
///
/// Returns `None` unless one of the known shapes yields two finite numbers,
/// so latitude and longitude are never partially present.
#[must_use]
pub fn resolve(raw: &Value) -> Option<Coordinate> {
    geojson(raw).or_else(|| scalar(raw))
}

fn geojson(raw: &Value) -> Option<Coordinate> {
    let coordinates = lookup(raw, &["location", "coordinates"])?.as_array()?;
    let [lon, lat, ..] = coordinates.as_slice() else {
        return None;
    };
    Coordinate::new(number(lat)?, number(lon)?)
}

fn scalar(raw: &Value) -> Option<Coordinate> {
    let lat = number(lookup(raw, &["data", "la"])?)?;
    let lon = number(lookup(raw, &["data", "lo"])?)?;
    Coordinate::new(lat, lon)
}
