#![allow(missing_docs)]
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use bytes::Bytes;
use http::{Method, Request, Response};
use serde_json::{Value, json};
use telemetry::HttpRequest;

pub const BASE_URL: &str = "http://localhost:8080";

type Handler = dyn Fn(&Request<Bytes>) -> Result<Response<Bytes>> + Send + Sync;

/// A request as seen by the mock.
#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub authorization: Option<String>,
    pub body: Bytes,
}

impl Recorded {
    #[must_use]
    pub fn param(&self, name: &str) -> Option<String> {
        param(&self.query, name)
    }

    #[allow(clippy::missing_panics_doc)]
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("should be JSON")
    }
}

/// Routes every request through a test-supplied handler and records it.
#[derive(Clone)]
pub struct MockProvider {
    handler: Arc<Handler>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockProvider {
    pub fn new(
        handler: impl Fn(&Request<Bytes>) -> Result<Response<Bytes>> + Send + Sync + 'static,
    ) -> Self {
        Self { handler: Arc::new(handler), requests: Arc::default() }
    }

    #[allow(clippy::missing_panics_doc)]
    #[must_use]
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("lock").clone()
    }
}

impl HttpRequest for MockProvider {
    async fn fetch(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let recorded = Recorded {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            query: request.uri().query().unwrap_or_default().to_string(),
            authorization: request
                .headers()
                .get(http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string),
            body: request.body().clone(),
        };
        self.requests.lock().expect("lock").push(recorded);

        (self.handler)(&request)
    }
}

/// Decoded query parameter of a raw query string.
#[must_use]
pub fn param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| urlencoding::decode(value).map(|v| v.into_owned()).ok()).flatten()
    })
}

/// Query parameter of an incoming request.
#[must_use]
pub fn query(request: &Request<Bytes>, name: &str) -> Option<String> {
    param(request.uri().query().unwrap_or_default(), name)
}

pub fn respond(status: u16, body: &Value) -> Result<Response<Bytes>> {
    let body = Bytes::from(serde_json::to_vec(body).context("failed to serialize body")?);
    Response::builder().status(status).body(body).context("failed to build response")
}

pub fn respond_text(status: u16, body: &str) -> Result<Response<Bytes>> {
    Response::builder()
        .status(status)
        .body(Bytes::from(body.to_string()))
        .context("failed to build response")
}

/// A historical record in the compact date encoding.
#[must_use]
pub fn record(device_id: &str, compact: &str, lat: f64, lon: f64) -> Value {
    json!({
        "deviceId": device_id,
        "dateTime": compact,
        "data": {"la": lat.to_string(), "lo": lon.to_string(), "v": "12"}
    })
}
