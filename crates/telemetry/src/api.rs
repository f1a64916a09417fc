//! # Upstream API client
//!
//! Thin JSON client for the GPS telemetry API. Transport is delegated to an
//! [`HttpRequest`] provider; the client owns the base URL and the bearer
//! token of the current session.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use bytes::Bytes;
use chrono::NaiveDate;
use chrono_tz::Tz;
use http::Method;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::fields::{lookup, scalar_text};
use crate::provider::HttpRequest;
use crate::reading::Reading;
use crate::{Error, Result};

/// Prefix the device endpoints are deployed behind.
pub const DEFAULT_PATH_PREFIX: &str = "/proxy/gps";

/// Topic historical readings are published under.
pub const DEFAULT_TOPIC: &str = "valle.gps";

/// Client for the telemetry API.
#[derive(Debug, Clone)]
pub struct ApiClient<P> {
    provider: P,
    base_url: String,
    path_prefix: String,
    token: Option<String>,
    timezone: Tz,
}

impl<P: HttpRequest> ApiClient<P> {
    /// Create an unauthenticated client for `base_url`.
    pub fn new(provider: P, base_url: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            token: None,
            timezone: Tz::UTC,
        }
    }

    /// Zone that reading times without an offset are read in.
    #[must_use]
    pub const fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Override the prefix of the device endpoints (use `""` for none).
    #[must_use]
    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Authenticate and keep the returned access token for later requests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] when the credentials are rejected or
    /// the response carries no access token.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<Session> {
        let url = format!("{}/auth/login", self.base_url);
        let body = credentials.body();

        let response = match self.send(Method::POST, &url, Some(&body)).await {
            Ok(response) => response,
            Err(err) => {
                return Err(match err.downcast_ref::<Error>() {
                    Some(Error::Upstream { status: 401 | 403, body }) => {
                        Error::Unauthorized(format!("login rejected: {body}"))
                    }
                    _ => err.into(),
                });
            }
        };

        let session = Session::from_login(&response)?;
        self.token = Some(session.token.clone());
        Ok(session)
    }

    /// Devices with their most recent point.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the API answers non-2xx.
    pub async fn devices_available(&self, page: u32, limit: u32, sort: &str) -> Result<Page> {
        let url = format!(
            "{}?page={page}&limit={limit}&sort={}",
            self.device_url("/available"),
            urlencoding::encode(sort)
        );
        let value = self.send(Method::GET, &url, None).await.context("listing available devices")?;
        Ok(Page::from_value(value))
    }

    /// Most recent reading of one device.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the API answers non-2xx.
    pub async fn last_reading(&self, device_id: &str) -> Result<Reading> {
        let url =
            self.device_url(&format!("/{}/last-reading", urlencoding::encode(device_id)));
        let value = self
            .send(Method::GET, &url, None)
            .await
            .with_context(|| format!("fetching last reading of {device_id}"))?;
        Ok(Reading::normalize_for(device_id, &value, self.timezone))
    }

    /// Most recent readings of several devices in one request. An empty id
    /// list yields an empty result without calling the API.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the API answers non-2xx.
    pub async fn last_readings(&self, device_ids: &[String]) -> Result<Vec<Reading>> {
        if device_ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}?ids={}",
            self.device_url("/last-reading"),
            urlencoding::encode(&device_ids.join(","))
        );
        let value = self.send(Method::GET, &url, None).await.context("fetching last readings")?;
        let page = Page::from_value(value);
        Ok(page.items.iter().map(|raw| Reading::normalize_in(raw, self.timezone)).collect())
    }

    /// One page of historical readings.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the API answers non-2xx.
    pub async fn readings_page(&self, device_id: &str, query: &ReadingsQuery) -> Result<Page> {
        let url = format!(
            "{}?{}",
            self.device_url(&format!("/{}/readings", urlencoding::encode(device_id))),
            query.query_string()
        );
        let value = self
            .send(Method::GET, &url, None)
            .await
            .with_context(|| format!("fetching readings of {device_id}"))?;
        Ok(Page::from_value(value))
    }

    /// Devices reporting near a position.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the API answers non-2xx.
    pub async fn near(&self, query: &NearQuery) -> Result<Page> {
        let url = format!(
            "{}?lat={}&long={}&distance={}&page={}&limit={}",
            self.device_url("/near"),
            query.lat,
            query.lon,
            query.distance_m,
            query.page,
            query.limit
        );
        let value = self.send(Method::GET, &url, None).await.context("searching nearby devices")?;
        Ok(Page::from_value(value))
    }

    /// Replace the metadata document of a user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for an empty user id, otherwise an error
    /// when the request fails or the API answers non-2xx.
    pub async fn update_user_metadata(&self, user_id: &str, metadata: &Value) -> Result<Value> {
        if user_id.trim().is_empty() {
            return Err(Error::BadRequest("missing user id".to_string()));
        }
        let url = format!("{}/users/{}/metadata", self.base_url, urlencoding::encode(user_id));
        let value = self
            .send(Method::PATCH, &url, Some(metadata))
            .await
            .with_context(|| format!("updating metadata of user {user_id}"))?;
        Ok(value)
    }

    fn device_url(&self, path: &str) -> String {
        format!("{}{}/device{path}", self.base_url, self.path_prefix)
    }

    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> anyhow::Result<Value> {
        let mut builder = http::Request::builder()
            .method(method)
            .uri(url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let body = match body {
            Some(value) => {
                Bytes::from(serde_json::to_vec(value).context("serializing request body")?)
            }
            None => Bytes::new(),
        };
        let request = builder.body(body).context("building request")?;

        let response = self.provider.fetch(request).await.context("telemetry API request failed")?;
        let status = response.status();
        let body = response.into_body();

        if !status.is_success() {
            return Err(anyhow!(Error::Upstream {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            }));
        }

        Ok(decode(&body))
    }
}

// Bodies that are not JSON are kept as `{"raw": text}` so list endpoints see
// an unrecognized shape instead of an error.
fn decode(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(body).unwrap_or_else(|err| {
        debug!(error = %err, "response body is not JSON");
        json!({"raw": String::from_utf8_lossy(body)})
    })
}

/// A list response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Value>,
    pub meta: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Bare(Vec<Value>),
    Wrapped {
        data: Vec<Value>,
        #[serde(default)]
        meta: Option<Value>,
    },
}

impl Page {
    /// Accepts a bare array or a `{data, meta}` envelope. Anything else is an
    /// empty page.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<Envelope>(value) {
            Ok(Envelope::Bare(items)) => Self { items, meta: None },
            Ok(Envelope::Wrapped { data, meta }) => Self { items: data, meta },
            Err(_) => {
                debug!("unrecognized list response shape");
                Self::default()
            }
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.items.len()
    }

    /// `meta.hasNext`, when the response says.
    #[must_use]
    pub fn has_next(&self) -> Option<bool> {
        self.meta.as_ref().and_then(|m| lookup(m, &["hasNext"])).and_then(Value::as_bool)
    }
}

/// Query parameters of the readings endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingsQuery {
    pub date_from: Option<NaiveDate>,
    /// Exclusive.
    pub date_to: Option<NaiveDate>,
    pub page: u32,
    pub limit: u32,
    pub topic: String,
}

impl Default for ReadingsQuery {
    fn default() -> Self {
        Self { date_from: None, date_to: None, page: 1, limit: 200, topic: DEFAULT_TOPIC.into() }
    }
}

impl ReadingsQuery {
    fn query_string(&self) -> String {
        let mut params = Vec::with_capacity(5);
        if let Some(from) = self.date_from {
            params.push(format!("dateFrom={}", from.format("%Y-%m-%d")));
        }
        if let Some(to) = self.date_to {
            params.push(format!("dateTo={}", to.format("%Y-%m-%d")));
        }
        params.push(format!("page={}", self.page));
        params.push(format!("limit={}", self.limit));
        params.push(format!("topic={}", urlencoding::encode(&self.topic)));
        params.join("&")
    }
}

/// Parameters of a proximity search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearQuery {
    pub lat: f64,
    pub lon: f64,
    pub distance_m: f64,
    pub page: u32,
    pub limit: u32,
}

impl NearQuery {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon, distance_m: 5_000.0, page: 1, limit: 20 }
    }
}

/// Name of the login field carrying the user name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginStyle {
    #[default]
    Alias,
    Username,
}

impl FromStr for LoginStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alias" => Ok(Self::Alias),
            "username" => Ok(Self::Username),
            other => Err(anyhow!("unknown login style: {other}")),
        }
    }
}

impl fmt::Display for LoginStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias => write!(f, "alias"),
            Self::Username => write!(f, "username"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub style: LoginStyle,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("style", &self.style)
            .finish()
    }
}

impl Credentials {
    fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert(self.style.to_string(), Value::String(self.username.clone()));
        body.insert("password".to_string(), Value::String(self.password.clone()));
        Value::Object(body)
    }
}

/// An authenticated session and the fleet it may see.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: Value,
    pub metadata: Option<Value>,
}

impl Session {
    fn from_login(response: &Value) -> Result<Self> {
        let token = lookup(response, &["accessToken"])
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Unauthorized("login response has no access token".into()))?;

        let metadata = lookup(response, &["metadata"])
            .or_else(|| lookup(response, &["user", "metadata"]))
            .cloned();

        Ok(Self {
            token: token.to_string(),
            user: response.get("user").cloned().unwrap_or(Value::Null),
            metadata,
        })
    }

    /// `user.id`, or `user._id` for older accounts.
    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        lookup(&self.user, &["id"]).or_else(|| lookup(&self.user, &["_id"])).and_then(scalar_text)
    }

    /// Ids of the devices this user may see.
    #[must_use]
    pub fn devices(&self) -> Vec<String> {
        self.metadata
            .as_ref()
            .and_then(|m| lookup(m, &["devices"]))
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(scalar_text).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_authorized(&self, device_id: &str) -> bool {
        self.devices().iter().any(|id| id == device_id)
    }

    /// Per-device metadata (`devices_meta.<id>`).
    #[must_use]
    pub fn device_meta(&self, device_id: &str) -> Option<&Value> {
        self.metadata.as_ref().and_then(|m| lookup(m, &["devices_meta", device_id]))
    }

    /// The configured device name, or the id.
    #[must_use]
    pub fn display_name(&self, device_id: &str) -> String {
        self.device_meta(device_id)
            .and_then(|m| lookup(m, &["name"]))
            .and_then(scalar_text)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| device_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn page_shapes() {
        let page = Page::from_value(json!([{"a": 1}, {"a": 2}]));
        assert_eq!(page.len(), 2);
        assert_eq!(page.has_next(), None);

        let page = Page::from_value(json!({"data": [{"a": 1}], "meta": {"hasNext": false}}));
        assert_eq!(page.len(), 1);
        assert_eq!(page.has_next(), Some(false));

        assert!(Page::from_value(json!({"items": [1, 2]})).is_empty());
        assert!(Page::from_value(json!({"raw": "<html>"})).is_empty());
        assert!(Page::from_value(Value::Null).is_empty());
    }

    #[test]
    fn readings_query() {
        let query = ReadingsQuery {
            date_from: NaiveDate::from_ymd_opt(2025, 10, 17),
            date_to: NaiveDate::from_ymd_opt(2025, 10, 18),
            ..ReadingsQuery::default()
        };
        assert_eq!(
            query.query_string(),
            "dateFrom=2025-10-17&dateTo=2025-10-18&page=1&limit=200&topic=valle.gps"
        );

        let query = ReadingsQuery { page: 3, topic: "a b".into(), ..ReadingsQuery::default() };
        assert_eq!(query.query_string(), "page=3&limit=200&topic=a%20b");
    }

    #[test]
    fn credentials_body() {
        let mut credentials = Credentials {
            username: "ana".into(),
            password: "secret".into(),
            style: LoginStyle::Alias,
        };
        assert_eq!(credentials.body(), json!({"alias": "ana", "password": "secret"}));

        credentials.style = LoginStyle::Username;
        assert_eq!(credentials.body(), json!({"username": "ana", "password": "secret"}));
        assert!(!format!("{credentials:?}").contains("secret"));
    }

    #[test]
    fn login_style() {
        assert_eq!("Username".parse::<LoginStyle>().unwrap(), LoginStyle::Username);
        assert_eq!(" alias ".parse::<LoginStyle>().unwrap(), LoginStyle::Alias);
        "email".parse::<LoginStyle>().unwrap_err();
    }

    #[test]
    fn session_metadata() {
        let response = json!({
            "accessToken": "t0k",
            "user": {
                "_id": 12,
                "metadata": {
                    "devices": [7, "8"],
                    "devices_meta": {"7": {"name": "Truck 7"}, "8": {"name": " "}}
                }
            }
        });
        let session = Session::from_login(&response).unwrap();

        assert_eq!(session.token, "t0k");
        assert_eq!(session.user_id().as_deref(), Some("12"));
        assert_eq!(session.devices(), vec!["7".to_string(), "8".to_string()]);
        assert!(session.is_authorized("8"));
        assert!(!session.is_authorized("9"));
        assert_eq!(session.display_name("7"), "Truck 7");
        assert_eq!(session.display_name("8"), "8");
    }

    #[test]
    fn top_level_metadata_wins() {
        let response = json!({
            "accessToken": "t0k",
            "metadata": {"devices": ["1"]},
            "user": {"id": "u", "metadata": {"devices": ["2"]}}
        });
        let session = Session::from_login(&response).unwrap();
        assert_eq!(session.devices(), vec!["1".to_string()]);
    }

    #[test]
    fn login_without_token() {
        let err = Session::from_login(&json!({"user": {}})).unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }
}
