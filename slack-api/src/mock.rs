//! In-memory workspace for tests.
//!
//! `MockSlack` serves collections registered page by page, and file bytes by
//! url. Failures can be injected at any page. Every request and download is
//! recorded so tests can assert on what was asked for.
//!
//! ```rust
//! use serde_json::json;
//! use slack_api::{mock::MockSlack, prelude::*};
//!
//! # async fn example() {
//! let slack = MockSlack::new().collection(
//!     "users.list",
//!     &[],
//!     vec![vec![json!({"id": "U1"})], vec![json!({"id": "U2"})]],
//! );
//! let users = slack.collect::<User>(&users_request()).await;
//! assert!(users.is_complete());
//! assert_eq!(users.pages, 2);
//! # }
//! ```

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use snafu::prelude::*;

use crate::{
    Result,
    client::SlackApi,
    error::{DeserializationSnafu, SlackError},
    paged::{Page, PageRequest},
};

/// Error to return in place of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// `"ok": false` with this error code
    Api(String),
    /// http 429
    RateLimited,
    /// http 401
    Unauthorized,
}

impl MockFailure {
    fn to_error(&self, method: &str) -> SlackError {
        let method = method.to_string();
        match self {
            Self::Api(error) => SlackError::Api {
                method,
                error: error.clone(),
            },
            Self::RateLimited => SlackError::RateLimited {
                method,
                retry_after: Some(1),
            },
            Self::Unauthorized => SlackError::Unauthorized { method },
        }
    }
}

#[derive(Debug, Default)]
struct Collection {
    pages: Vec<Vec<Value>>,
    failures: HashMap<usize, MockFailure>,
}

/// One recorded `fetch_page` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub query: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct MockState {
    collections: HashMap<String, Collection>,
    files: HashMap<String, Bytes>,
    requests: Vec<RecordedRequest>,
    downloads: Vec<String>,
}

/// In-memory implementation of [`SlackApi`].
#[derive(Debug, Default)]
pub struct MockSlack {
    state: Mutex<MockState>,
}

// Collections are keyed on method and fixed params, so each channel's
// history is its own collection.
fn collection_key(method: &str, params: &[(String, String)]) -> String {
    let params = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{method}?{params}")
}

fn cursor_for(page: usize) -> String {
    format!("page-{page}")
}

impl MockSlack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a collection served as the given pages, in order.
    /// `params` are the fixed parameters of the request (not cursor or limit).
    #[must_use]
    pub fn collection(self, method: &str, params: &[(&str, &str)], pages: Vec<Vec<Value>>) -> Self {
        let params: Vec<(String, String)> = params
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        self.state
            .lock()
            .collections
            .entry(collection_key(method, &params))
            .or_default()
            .pages = pages;
        self
    }

    /// Makes the request for page `page` (0-based) of a collection fail.
    #[must_use]
    pub fn fail_page(
        self,
        method: &str,
        params: &[(&str, &str)],
        page: usize,
        failure: MockFailure,
    ) -> Self {
        let params: Vec<(String, String)> = params
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        self.state
            .lock()
            .collections
            .entry(collection_key(method, &params))
            .or_default()
            .failures
            .insert(page, failure);
        self
    }

    /// Registers the bytes served for a file url.
    #[must_use]
    pub fn file(self, url: &str, bytes: impl Into<Bytes>) -> Self {
        self.state.lock().files.insert(url.to_string(), bytes.into());
        self
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Urls downloaded, in order.
    pub fn downloads(&self) -> Vec<String> {
        self.state.lock().downloads.clone()
    }

    fn page_values(&self, request: &PageRequest, cursor: Option<&str>) -> Result<Page<Value>> {
        let mut state = self.state.lock();
        state.requests.push(RecordedRequest {
            method: request.method.clone(),
            query: request.query(cursor),
        });

        let index = match cursor {
            None => 0,
            Some(cursor) => cursor
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| SlackError::Api {
                    method: request.method.clone(),
                    error: "invalid_cursor".to_string(),
                })?,
        };

        // unregistered collections are empty
        let Some(collection) = state
            .collections
            .get(&collection_key(&request.method, &request.params))
        else {
            return Ok(Page::last(Vec::new()));
        };
        if let Some(failure) = collection.failures.get(&index) {
            return Err(failure.to_error(&request.method));
        }
        let items = collection.pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < collection.pages.len()).then(|| cursor_for(index + 1));
        Ok(Page::new(items, next.as_deref()))
    }
}

impl SlackApi for MockSlack {
    async fn fetch_page<T: DeserializeOwned>(
        &self,
        request: &PageRequest,
        cursor: Option<&str>,
    ) -> Result<Page<T>> {
        let page = self.page_values(request, cursor)?;
        let items = serde_json::from_value(Value::Array(page.items))
            .context(DeserializationSnafu)?;
        Ok(Page::new(items, page.next_cursor.as_deref()))
    }

    async fn download(&self, url: &str) -> Result<Bytes> {
        let mut state = self.state.lock();
        state.downloads.push(url.to_string());
        state
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| SlackError::Download {
                code: 404,
                url: url.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::users::{User, users_request};

    #[tokio::test]
    async fn test_pages_chain_by_cursor() {
        let slack = MockSlack::new().collection(
            "users.list",
            &[],
            vec![
                vec![json!({"id": "U1"}), json!({"id": "U2"})],
                vec![json!({"id": "U3"})],
            ],
        );
        let users = slack.collect::<User>(&users_request()).await;
        assert!(users.is_complete());
        assert_eq!(users.len(), 3);

        let cursors: Vec<Option<String>> = slack
            .requests()
            .iter()
            .map(|request| {
                request
                    .query
                    .iter()
                    .find(|(key, _)| key == "cursor")
                    .map(|(_, value)| value.clone())
            })
            .collect();
        assert_eq!(cursors, vec![None, Some("page-1".to_string())]);
    }

    #[tokio::test]
    async fn test_injected_failure_is_partial() {
        let slack = MockSlack::new()
            .collection(
                "users.list",
                &[],
                vec![vec![json!({"id": "U1"})], vec![json!({"id": "U2"})]],
            )
            .fail_page("users.list", &[], 1, MockFailure::RateLimited);
        let users = slack.collect::<User>(&users_request()).await;
        assert!(!users.is_complete());
        assert!(!users.outcome.is_failed());
        assert_eq!(users.len(), 1);
        assert!(users.outcome.cause().is_some_and(SlackError::is_rate_limit));
    }

    #[tokio::test]
    async fn test_download_unknown_url() {
        let slack = MockSlack::new().file("https://files.example/a", &b"abc"[..]);
        assert_eq!(
            slack.download("https://files.example/a").await.unwrap(),
            Bytes::from_static(b"abc")
        );
        let err = slack.download("https://files.example/b").await.unwrap_err();
        assert!(matches!(err, SlackError::Download { code: 404, .. }));
        assert_eq!(slack.downloads().len(), 2);
    }
}
