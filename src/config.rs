use std::env;
use std::time::Duration as StdDuration;

use chrono::Duration;
use chrono_tz::Tz;
use telemetry::api::{DEFAULT_PATH_PREFIX, DEFAULT_TOPIC};
use telemetry::distance::MAX_SEGMENT_KM;
use telemetry::fleet::STALE_AFTER_HOURS;
use telemetry::{LoginStyle, RangeOptions, StopConfig};

const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_GEOCODE_URL: &str = "https://nominatim.openstreetmap.org";

/// Runtime settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub path_prefix: String,
    pub login_style: LoginStyle,
    pub topic: String,
    pub page_limit: u32,
    pub max_pages: u32,
    pub timezone: Tz,
    pub stale_after: Duration,
    pub stops: StopConfig,
    pub max_segment_km: f64,
    pub geocode_url: String,
    /// Preferred language of geocoded addresses.
    pub geocode_language: String,
    pub http_timeout: StdDuration,
}

impl Config {
    pub fn from_env() -> Self {
        let timezone = env::var("TIMEZONE").map_or(Tz::UTC, |value| parse_timezone(&value));
        let login_style = env::var("FLEET_LOGIN_STYLE")
            .ok()
            .and_then(|value| value.parse::<LoginStyle>().ok())
            .unwrap_or_default();
        let defaults = StopConfig::default();
        let stops = StopConfig {
            radius_m: env_f64("FLEET_STOP_RADIUS_M", defaults.radius_m),
            min_points: env_usize("FLEET_STOP_MIN_POINTS", defaults.min_points),
            min_duration: Duration::minutes(env_i64(
                "FLEET_STOP_MIN_MINUTES",
                defaults.min_duration.num_minutes(),
            )),
        };

        Self {
            api_url: env_string("FLEET_API_URL", DEFAULT_API_URL),
            path_prefix: env_string("FLEET_API_PREFIX", DEFAULT_PATH_PREFIX),
            login_style,
            topic: env_string("FLEET_TOPIC", DEFAULT_TOPIC),
            page_limit: env_u32("FLEET_PAGE_LIMIT", 200),
            max_pages: env_u32("FLEET_MAX_PAGES", 10),
            timezone,
            stale_after: Duration::hours(env_i64("FLEET_STALE_HOURS", STALE_AFTER_HOURS)),
            stops,
            max_segment_km: env_f64("FLEET_MAX_SEGMENT_KM", MAX_SEGMENT_KM),
            geocode_url: env_string("GEOCODE_URL", DEFAULT_GEOCODE_URL),
            geocode_language: env_string("GEOCODE_LANGUAGE", "es"),
            http_timeout: StdDuration::from_secs(env_u64("HTTP_TIMEOUT_SECS", 30)),
        }
    }

    /// Options for historical range fetches.
    pub fn range_options(&self) -> RangeOptions {
        RangeOptions {
            limit: self.page_limit,
            max_pages: self.max_pages,
            topic: self.topic.clone(),
            timezone: self.timezone,
            ..RangeOptions::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Zone named by `value`, or UTC (with a warning) when it is not a known zone.
fn parse_timezone(value: &str) -> Tz {
    value.trim().parse::<Tz>().unwrap_or_else(|err| {
        tracing::warn!(value, error = %err, "unknown TIMEZONE, day boundaries fall back to UTC");
        Tz::UTC
    })
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|value| !value.trim().is_empty()).unwrap_or_else(|| {
        tracing::trace!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|value| value.parse::<f64>().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|value| value.parse::<i64>().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|value| value.parse::<u32>().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|value| value.parse::<u64>().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|value| value.parse::<usize>().ok()).unwrap_or(default)
}
