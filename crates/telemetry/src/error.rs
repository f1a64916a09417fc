//! # Telemetry Errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced to callers of the telemetry client.
///
/// Decode problems inside individual records never show up here: they are
/// resolved by the normalizer's fallback defaults.
#[derive(Error, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Error {
    /// A caller-supplied time window is not usable (e.g. end before start).
    #[error("code: invalid_window, description: {0}")]
    InvalidWindow(String),

    /// A request is missing or has malformed input.
    #[error("code: bad_request, description: {0}")]
    BadRequest(String),

    /// A response body could not be decoded.
    #[error("code: invalid_format, description: {0}")]
    InvalidFormat(String),

    /// The upstream API answered with a non-2xx status.
    #[error("code: upstream, description: HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Login was rejected or returned no access token.
    #[error("code: unauthorized, description: {0}")]
    Unauthorized(String),

    /// The account is not allowed to perform the operation.
    #[error("code: forbidden, description: {0}")]
    Forbidden(String),

    #[error("code: server_error, description: {0}")]
    ServerError(String),
}

impl Error {
    /// Returns the error code.
    #[must_use]
    pub const fn code(&self) -> &str {
        match self {
            Self::InvalidWindow(_) => "invalid_window",
            Self::BadRequest(_) => "bad_request",
            Self::InvalidFormat(_) => "invalid_format",
            Self::Upstream { .. } => "upstream",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::ServerError(_) => "server_error",
        }
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> String {
        self.to_string()
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<Self>() {
            Some(Self::InvalidWindow(e)) => Self::InvalidWindow(format!("{err}: {e}")),
            Some(Self::BadRequest(e)) => Self::BadRequest(format!("{err}: {e}")),
            Some(Self::InvalidFormat(e)) => Self::InvalidFormat(format!("{err}: {e}")),
            Some(Self::Unauthorized(e)) => Self::Unauthorized(format!("{err}: {e}")),
            Some(Self::Forbidden(e)) => Self::Forbidden(format!("{err}: {e}")),
            Some(Self::ServerError(e)) => Self::ServerError(format!("{err}: {e}")),

            // status and body are kept verbatim so callers can branch on them
            Some(Self::Upstream { status, body }) => {
                Self::Upstream { status: *status, body: body.clone() }
            }
            None => {
                let stack = err.chain().fold(String::new(), |cause, e| format!("{cause} -> {e}"));
                let stack = stack.trim_start_matches(" -> ").to_string();
                Self::ServerError(stack)
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidFormat(format!("failed to deserialize response: {err}"))
    }
}
