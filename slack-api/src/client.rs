//! Slack Web API client
//!
//! # Creating new api client
//!
//! - [new](SlackClient::new) - create new client with default configuration
//! - [with_config](SlackClient::with_config) - create client with custom configuration
//! - [with_client](SlackClient::with_client) - create client with configuration and custom reqwest client
//!
//! # Reading collections
//!
//! [`SlackApi`] is the seam between the exporter and the platform. It has two
//! primitives, one page of a list method and one file download, and a provided
//! [`collect`](SlackApi::collect) that pages through a whole collection.
//! [`SlackClient`] implements it over HTTP; tests use [`crate::mock::MockSlack`].
//!

use std::future::Future;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    Result,
    config::{DEFAULT_SLACK_API_URL, SLACK_API_URL_ENV},
    http_client::{HttpClient, HttpMetricsSnapshot},
    paged::{Collected, Page, PageRequest, collect_pages},
    token::SecretToken,
};

/// Access to the platform, one request at a time.
pub trait SlackApi {
    /// Fetches one page of `request`, starting at `cursor` (first page if `None`).
    fn fetch_page<T: DeserializeOwned>(
        &self,
        request: &PageRequest,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<Page<T>>>;

    /// Downloads a private file url with the workspace token.
    fn download(&self, url: &str) -> impl Future<Output = Result<Bytes>>;

    /// Fetches every page of `request`. See [`collect_pages`].
    fn collect<T: DeserializeOwned>(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Collected<T>> {
        collect_pages(&request.label, move |cursor| async move {
            self.fetch_page(request, cursor.as_deref()).await
        })
    }
}

/// Configuration for the Slack client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base url for Web API methods.
    /// If not provided, url is determined by:
    /// * The environment variable SLACK_API_URL, if defined, or
    /// * "https://slack.com/api"
    pub base_url: String,

    /// Bot or user token. A user token sees private channels the user belongs to.
    pub token: SecretToken,
}

impl ClientConfig {
    pub fn new(token: impl Into<SecretToken>) -> Self {
        ClientConfig {
            base_url: std::env::var(SLACK_API_URL_ENV)
                .unwrap_or_else(|_| DEFAULT_SLACK_API_URL.to_string()),
            token: token.into(),
        }
    }

    /// Sets the base url.
    pub fn base_url(self, base_url: impl Into<String>) -> Self {
        ClientConfig {
            base_url: base_url.into(),
            ..self
        }
    }
}

/// Slack Web API client.
#[derive(Debug, Clone)]
pub struct SlackClient {
    pub(crate) client: HttpClient,
}

impl SlackClient {
    /// Creates a new client with default configuration.
    pub fn new(token: impl Into<SecretToken>) -> Result<Self> {
        Self::with_config(ClientConfig::new(token))
    }

    /// Creates a new client with the provided configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let builder = reqwest::Client::builder()
            .user_agent(concat!("slack-api/", env!("CARGO_PKG_VERSION")));
        Self::with_client(builder, config)
    }

    /// Creates a client from a `reqwest::ClientBuilder` and configuration.
    /// ClientBuilder can be customized with timeouts, proxies, dns servers, etc.
    pub fn with_client(builder: reqwest::ClientBuilder, config: ClientConfig) -> Result<Self> {
        debug!(url=?config.base_url, "new client");
        let client = HttpClient::new(builder, config.base_url, config.token)?;
        Ok(Self { client })
    }

    /// Returns a snapshot of current HTTP metrics.
    pub fn http_metrics(&self) -> HttpMetricsSnapshot {
        self.client.metrics_snapshot()
    }
}

impl SlackApi for SlackClient {
    async fn fetch_page<T: DeserializeOwned>(
        &self,
        request: &PageRequest,
        cursor: Option<&str>,
    ) -> Result<Page<T>> {
        let response = self
            .client
            .call(&request.method, &request.query(cursor))
            .await?;
        Page::from_response(&request.field, response)
    }

    async fn download(&self, url: &str) -> Result<Bytes> {
        self.client.download(url).await
    }
}
