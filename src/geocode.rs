//! # Reverse geocoding
//!
//! Street addresses for route points, looked up against a Nominatim-compatible
//! `reverse` endpoint. Lookups are cached per instance and paced so a long
//! route does not trip the service's rate limit.

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use dashmap::DashMap;
use http::Method;
use http::header::ACCEPT;
use serde::Deserialize;
use telemetry::{Coordinate, HttpRequest, Reading};
use tracing::{debug, warn};

/// Lookups between pauses.
const BATCH: usize = 5;
const PAUSE: Duration = Duration::from_millis(300);

// Coordinates rounded to 5 decimals (about 1 m).
type Key = (i64, i64);

#[derive(Deserialize)]
struct Place {
    #[serde(default)]
    display_name: Option<String>,
}

pub struct Geocoder<P> {
    provider: P,
    base_url: String,
    language: String,
    pause: Duration,
    cache: DashMap<Key, String>,
}

impl<P: HttpRequest> Geocoder<P> {
    pub fn new(provider: P, base_url: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            language: "es".to_string(),
            pause: PAUSE,
            cache: DashMap::new(),
        }
    }

    /// Preferred language of the returned addresses.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    #[must_use]
    pub const fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Address of `position`, or an empty string when the lookup fails.
    pub async fn reverse(&self, position: Coordinate) -> String {
        self.lookup(position).await.0
    }

    /// Addresses for `readings`, aligned by index. Readings without a position
    /// get an empty address.
    pub async fn addresses(&self, readings: &[Reading]) -> Vec<String> {
        let mut addresses = Vec::with_capacity(readings.len());
        let mut fetched = 0;

        for reading in readings {
            let Some(position) = reading.position else {
                addresses.push(String::new());
                continue;
            };

            let (address, remote) = self.lookup(position).await;
            addresses.push(address);

            if remote {
                fetched += 1;
                if fetched % BATCH == 0 {
                    tokio::time::sleep(self.pause).await;
                }
            }
        }

        debug!(points = readings.len(), lookups = fetched, "addresses resolved");
        addresses
    }

    // The flag is true when the address came from the service.
    async fn lookup(&self, position: Coordinate) -> (String, bool) {
        let key = key(position);
        if let Some(address) = self.cache.get(&key) {
            return (address.value().clone(), false);
        }

        let address = match self.fetch(position).await {
            Ok(address) => address,
            Err(err) => {
                warn!(lat = position.lat, lon = position.lon, error = %err, "reverse geocoding failed");
                return (String::new(), true);
            }
        };
        self.cache.insert(key, address.clone());
        (address, true)
    }

    async fn fetch(&self, position: Coordinate) -> Result<String> {
        let url = format!(
            "{}/reverse?format=jsonv2&lat={}&lon={}&zoom=18&addressdetails=1&accept-language={}",
            self.base_url,
            position.lat,
            position.lon,
            urlencoding::encode(&self.language)
        );
        let request = http::Request::builder()
            .method(Method::GET)
            .uri(url)
            .header(ACCEPT, "application/json")
            .body(Bytes::new())
            .context("building reverse geocode request")?;

        let response = self.provider.fetch(request).await.context("reverse geocode request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("geocoder answered HTTP {}", response.status());
        }

        let place: Place = serde_json::from_slice(response.body())
            .context("failed to deserialize reverse geocode response")?;
        Ok(place.display_name.unwrap_or_default())
    }
}

#[allow(clippy::cast_possible_truncation)]
fn key(position: Coordinate) -> Key {
    ((position.lat * 1e5).round() as i64, (position.lon * 1e5).round() as i64)
}
