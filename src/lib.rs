//! # Fleet
//!
//! Host side of the telemetry client: outbound HTTP, configuration, reverse
//! geocoding, the route session and CSV import/export.

pub mod config;
pub mod csv_io;
pub mod geocode;
pub mod provider;
pub mod session;

pub use self::config::Config;
pub use self::geocode::Geocoder;
pub use self::provider::Provider;
pub use self::session::{Route, RouteSession};
