//! Errors returned by `SlackClient`
//!
use snafu::prelude::*;

/// Errors returned by slack-api crate
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SlackError {
    // Http connection or timeout error
    #[snafu(display("HTTP error {method} url:{url}"))]
    Http {
        method: String,
        url: String,
        source: reqwest::Error,
    },

    /// Server responded with a non-success http status.
    #[snafu(display("Slack server returned http {code} for {method}: {message}"))]
    ApiStatus {
        code: u16,
        method: String,
        message: String,
    },

    /// The platform accepted the request but reported `"ok": false`.
    /// `error` is the platform's error code, for example `channel_not_found`.
    #[snafu(display("Slack api {method} failed: {error}"))]
    Api { method: String, error: String },

    /// Http 429. The client does not wait or retry; the caller decides what to do
    /// with a short result.
    #[snafu(display("Rate limited on {method} (retry after {} secs)", retry_after.unwrap_or_default()))]
    RateLimited {
        method: String,
        retry_after: Option<u64>,
    },

    /// Token is missing, revoked, or lacks the scope for the method.
    #[snafu(display("Not authorized for {method}"))]
    Unauthorized { method: String },

    /// Deserialization error. This means we didn't deserialize a server response correctly.
    #[snafu(display("Deserialization: {source}"))]
    Deserialization { source: serde_json::Error },

    /// The platform handed back a cursor that was already requested in the
    /// same collection.
    #[snafu(display("Pagination cursor repeated: {cursor}"))]
    CursorCycle { cursor: String },

    /// File download returned a non-success status
    #[snafu(display("Download failed ({code}) {url}"))]
    Download { code: u16, url: String },
}

impl SlackError {
    /// Returns the platform error code, if the platform reported one.
    pub fn api_error(&self) -> Option<&str> {
        match self {
            Self::Api { error, .. } => Some(error.as_str()),
            _ => None,
        }
    }

    /// True for errors caused by request volume rather than by the request itself.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
            || self.api_error() == Some("ratelimited")
    }
}
