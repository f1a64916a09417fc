//! # Telemetry
//!
//! Turns GPS telemetry pulled from the upstream device API into a single
//! canonical, time-ordered point stream and derives trip analytics from it:
//! travelled distance, dwell stops and fleet status.

mod error;
mod fields;

pub mod account;
pub mod api;
pub mod coordinate;
pub mod distance;
pub mod event;
pub mod fleet;
pub mod provider;
pub mod range;
pub mod reading;
pub mod report;
pub mod stops;
pub mod timestamp;

pub use self::account::{Base, DeviceDetails, MAX_BASES};
pub use self::api::{ApiClient, Credentials, LoginStyle, NearQuery, Page, ReadingsQuery, Session};
pub use self::coordinate::Coordinate;
pub use self::error::Error;
pub use self::event::{EventCode, VehicleState};
pub use self::fleet::{DeviceStatus, FleetStatus};
pub use self::provider::HttpRequest;
pub use self::range::{RangeOptions, TimeWindow, fetch_range};
pub use self::reading::Reading;
pub use self::report::TripReport;
pub use self::stops::{StopConfig, StopEvent};

/// Result type for telemetry operations.
pub type Result<T> = anyhow::Result<T, Error>;
