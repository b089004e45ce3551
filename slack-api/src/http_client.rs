//! HttpClient middleware used by SlackClient
//!
//! Responsible for
//!  - handing all Web API requests and file downloads
//!  - logging/tracing
//!  - mapping http status and `"ok": false` responses into `SlackError`
//!  - metrics
//!
//! Requests are attempted once. A 429 response becomes `SlackError::RateLimited`
//! with the server's `Retry-After` hint; waiting is the caller's decision.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use reqwest::{ClientBuilder, Method, StatusCode, header::HeaderMap};
use serde::de::DeserializeOwned;
use serde_json::Value;
use snafu::prelude::*;
use tracing::{debug, error, trace};

use crate::{Result, error::*, token::SecretToken};

/// HTTP metrics tracked using atomic counters for thread-safe access.
/// These counters are cumulative and never reset during the client's lifetime.
#[derive(Debug, Default)]
pub struct HttpMetrics {
    /// Total number of api requests sent (excludes file downloads)
    total_requests: AtomicU64,
    /// Total number of successful api responses (2xx and `"ok": true`)
    successful_responses: AtomicU64,
    /// Total number of error responses, including `"ok": false`
    errors: AtomicU64,
    /// Total number of rate limit errors (429 responses)
    rate_limit_errors: AtomicU64,
    /// Total number of files downloaded
    files_downloaded: AtomicU64,
    /// Total bytes received in response bodies and downloads
    bytes_received: AtomicU64,
}

impl HttpMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of current metrics as plain u64 values
    pub fn snapshot(&self) -> HttpMetricsSnapshot {
        HttpMetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_responses: self.successful_responses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            rate_limit_errors: self.rate_limit_errors.load(Ordering::Relaxed),
            files_downloaded: self.files_downloaded.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }

    fn increment_requests(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_success(&self) {
        self.successful_responses.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_rate_limit_errors(&self) {
        self.rate_limit_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_downloads(&self) {
        self.files_downloaded.fetch_add(1, Ordering::Relaxed);
    }

    fn add_bytes_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of HTTP metrics with plain u64 values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpMetricsSnapshot {
    pub total_requests: u64,
    pub successful_responses: u64,
    pub errors: u64,
    pub rate_limit_errors: u64,
    pub files_downloaded: u64,
    pub bytes_received: u64,
}

impl std::fmt::Display for HttpMetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "requests={} success={} errors={} rate_limit={} downloads={} recv={}",
            self.total_requests,
            self.successful_responses,
            self.errors,
            self.rate_limit_errors,
            self.files_downloaded,
            format_bytes(self.bytes_received),
        )
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes}B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    client: reqwest::Client,

    /// Base URL for Web API methods (e.g., "https://slack.com/api")
    base_url: String,

    token: SecretToken,

    /// HTTP request/response metrics
    metrics: Arc<HttpMetrics>,
}

/// Reads the `Retry-After` header (seconds) from a 429 response.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    match value.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(_) => {
            error!("Could not parse 429 response header 'retry-after: {value}'");
            None
        }
    }
}

impl HttpClient {
    pub fn new(builder: ClientBuilder, base_url: String, token: SecretToken) -> Result<Self> {
        let client = builder.build().context(HttpSnafu {
            method: "client-init",
            url: "",
        })?;
        Ok(HttpClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            metrics: Arc::new(HttpMetrics::new()),
        })
    }

    /// Returns a snapshot of current HTTP metrics
    pub fn metrics_snapshot(&self) -> HttpMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Calls a Web API method with GET and returns the response object.
    /// - maps 429 to `RateLimited`, 401/403 to `Unauthorized`
    /// - maps `"ok": false` to `Api` with the platform's error code
    pub async fn call(&self, method: &str, query: &[(String, String)]) -> Result<Value> {
        let full_url = format!("{}/{method}", self.base_url);
        let req_builder = self
            .token
            .set_auth_header(self.client.request(Method::GET, &full_url))
            .query(query);

        log_request(&req_builder);
        self.metrics.increment_requests();

        let response = req_builder.send().await.map_err(|e| {
            error!(source=?e, method, "http");
            self.metrics.increment_errors();
            SlackError::Http {
                method: method.to_string(),
                url: full_url.clone(),
                source: e,
            }
        })?;

        let code = response.status();
        match code {
            ok if ok.is_success() => {}
            StatusCode::TOO_MANY_REQUESTS /* 429 */ => {
                self.metrics.increment_rate_limit_errors();
                let retry_after = parse_retry_after(response.headers());
                error!(?code, method, retry_after, "http");
                return Err(SlackError::RateLimited {
                    method: method.to_string(),
                    retry_after,
                });
            }
            StatusCode::UNAUTHORIZED /* 401 */ | StatusCode::FORBIDDEN /* 403 */ => {
                self.metrics.increment_errors();
                error!(?code, method, "http");
                return Err(SlackError::Unauthorized {
                    method: method.to_string(),
                });
            }
            _ => {
                self.metrics.increment_errors();
                let message = response.text().await.unwrap_or_default();
                error!(?code, method, message, "http");
                return Err(SlackError::ApiStatus {
                    code: code.as_u16(),
                    method: method.to_string(),
                    message,
                });
            }
        }

        let body = response.bytes().await.context(HttpSnafu {
            method: method.to_string(),
            url: full_url.clone(),
        })?;
        self.metrics.add_bytes_received(body.len() as u64);
        log_response(method, &body);

        let value: Value = deserialize_json(&body)?;
        if value.get("ok").and_then(Value::as_bool) != Some(true) {
            self.metrics.increment_errors();
            let error = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            error!(method, error, "api");
            return Err(SlackError::Api {
                method: method.to_string(),
                error,
            });
        }
        self.metrics.increment_success();
        Ok(value)
    }

    /// Downloads a private file url with bearer authorization.
    pub async fn download(&self, url: &str) -> Result<Bytes> {
        debug!(url, "download");
        let response = self
            .token
            .set_auth_header(self.client.get(url))
            .send()
            .await
            .context(HttpSnafu {
                method: "download",
                url,
            })?;
        let code = response.status();
        if !code.is_success() {
            error!(?code, url, "download");
            return Err(SlackError::Download {
                code: code.as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.bytes().await.context(HttpSnafu {
            method: "download",
            url,
        })?;
        self.metrics.increment_downloads();
        self.metrics.add_bytes_received(body.len() as u64);
        Ok(body)
    }
}

// dump request
// requires RUST_LOG=slack_api::http_json=trace
fn log_request(builder: &reqwest::RequestBuilder) {
    if tracing::enabled!(target: "slack_api::http_json", tracing::Level::TRACE)
        && let Some(req) = builder.try_clone().and_then(|b| b.build().ok())
    {
        // don't log headers so we don't leak the token
        trace!(target: "slack_api::http_json", "{} url={}", req.method(), req.url());
    }
}

// dump json response, for debugging
fn log_response(method: &str, body: &Bytes) {
    if tracing::enabled!(target: "slack_api::http_json", tracing::Level::TRACE) {
        trace!(target: "slack_api::http_json", "Response method={method} body={}",
            String::from_utf8_lossy(body)
        );
    }
}

// deserialize, reporting errors with 'serde_path_to_error', which provides
// detailed json path to the error
fn deserialize_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(body);
    match serde_path_to_error::deserialize(&mut deserializer) {
        Ok(value) => Ok(value),
        Err(err) => {
            error!("Deserialization failed at {}: {}", err.path(), err);
            Err(SlackError::Deserialization {
                source: err.into_inner(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderMap, HeaderValue};

    use super::*;

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert("retry-after", HeaderValue::from_static("30"));
        assert_eq!(parse_retry_after(&headers), Some(30));
        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_metrics_display() {
        let snapshot = HttpMetricsSnapshot {
            total_requests: 4,
            successful_responses: 3,
            errors: 1,
            rate_limit_errors: 1,
            files_downloaded: 2,
            bytes_received: 2048,
        };
        assert_eq!(
            snapshot.to_string(),
            "requests=4 success=3 errors=1 rate_limit=1 downloads=2 recv=2.0KB"
        );
    }

    #[test]
    fn test_deserialize_json_reports_error() {
        let err = deserialize_json::<Value>(b"{not json").unwrap_err();
        assert!(matches!(err, SlackError::Deserialization { .. }));
    }
}
