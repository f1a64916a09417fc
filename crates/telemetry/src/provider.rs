//! # Provider
//!
//! Provider defines external data interfaces for the crate.

use anyhow::Result;
use bytes::Bytes;
use http::{Request, Response};

/// The `HttpRequest` trait defines the behavior for fetching data from a source.
///
/// Implementations only report transport failures as errors; any HTTP status,
/// including non-2xx, is returned as a `Response` for the client to judge.
pub trait HttpRequest: Send + Sync {
    /// Make outbound HTTP request.
    fn fetch(&self, request: Request<Bytes>)
    -> impl Future<Output = Result<Response<Bytes>>> + Send;
}
