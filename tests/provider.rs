#![allow(missing_docs)]
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use bytes::Bytes;
use http::{Request, Response};
use serde_json::Value;
use telemetry::HttpRequest;

pub const BASE_URL: &str = "http://localhost:8080";

type Handler = dyn Fn(&Request<Bytes>) -> Result<Response<Bytes>> + Send + Sync;

/// Answers every request with a test-supplied handler and keeps the URIs it
/// was asked for.
#[derive(Clone)]
pub struct MockProvider {
    handler: Arc<Handler>,
    uris: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    pub fn new(
        handler: impl Fn(&Request<Bytes>) -> Result<Response<Bytes>> + Send + Sync + 'static,
    ) -> Self {
        Self { handler: Arc::new(handler), uris: Arc::default() }
    }

    #[allow(clippy::missing_panics_doc)]
    #[must_use]
    pub fn uris(&self) -> Vec<String> {
        self.uris.lock().expect("lock").clone()
    }
}

impl HttpRequest for MockProvider {
    async fn fetch(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.uris.lock().expect("lock").push(request.uri().to_string());
        (self.handler)(&request)
    }
}

/// Decoded query parameter of a request.
#[must_use]
pub fn query(request: &Request<Bytes>, name: &str) -> Option<String> {
    request.uri().query().unwrap_or_default().split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key != name {
            return None;
        }
        urlencoding::decode(value).ok().map(|v| v.into_owned())
    })
}

#[allow(clippy::missing_errors_doc)]
pub fn respond(status: u16, body: &Value) -> Result<Response<Bytes>> {
    Ok(Response::builder().status(status).body(Bytes::from(serde_json::to_vec(body)?))?)
}
