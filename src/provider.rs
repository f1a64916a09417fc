//! # Provider
//!
//! Outbound HTTP over `reqwest` for the telemetry client and the geocoder.

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use http::{Request, Response};
use telemetry::HttpRequest;

#[derive(Debug, Clone)]
pub struct Provider {
    client: reqwest::Client,
}

impl Provider {
    /// Create a provider whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error when the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

impl HttpRequest for Provider {
    async fn fetch(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        tracing::debug!(method = %request.method(), uri = %request.uri(), "outbound request");

        let request = reqwest::Request::try_from(request).context("converting request")?;
        let response = self.client.execute(request).await.context("sending request")?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.context("reading response body")?;

        let mut response =
            Response::builder().status(status).body(body).context("building response")?;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
