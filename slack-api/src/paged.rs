//! Cursor pagination for Slack list methods.
//!
//! `Page<T>` is one bounded response from a list method.
//!
//! [`collect_pages`] drives a page-fetch operation until the platform stops
//! handing back cursors, and returns a [`Collected<T>`]: every item fetched,
//! plus an [`Outcome`] saying whether the collection is known to be complete.
//!
//! A failure part way through does not discard what was already fetched. The
//! caller receives the items plus `Outcome::Partial` (or `Outcome::Failed` if
//! the first page failed) and decides what a short result means for it.
//!
use std::{collections::HashSet, fmt, future::Future};

use serde::de::DeserializeOwned;
use serde_json::Value;
use snafu::prelude::*;
use tracing::{debug, error, info, warn};

use crate::{
    Result,
    error::{DeserializationSnafu, SlackError},
};

/// Default page size requested from list methods.
/// Slack recommends no more than 200 results per page.
pub const DEFAULT_PAGE_LIMIT: u32 = 200;

/// One page from a cursor-paginated list method.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the following page. `None` at end of collection.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// Creates a page. An empty cursor is treated the same as no cursor.
    pub fn new(items: Vec<T>, next_cursor: Option<&str>) -> Self {
        Self {
            items,
            next_cursor: next_cursor
                .filter(|cursor| !cursor.is_empty())
                .map(str::to_string),
        }
    }

    /// Creates the final page of a collection.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True if the platform indicated more pages remain.
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

impl<T: DeserializeOwned> Page<T> {
    /// Extracts a page from a Slack response object.
    ///
    /// Items are read from `field`; a missing field is an empty page. The cursor
    /// is read from `response_metadata.next_cursor`. Missing metadata, or an
    /// empty cursor, ends the collection.
    pub fn from_response(field: &str, mut response: Value) -> Result<Self> {
        let items = match response.get_mut(field).map(Value::take) {
            Some(Value::Null) | None => Vec::new(),
            Some(value) => serde_json::from_value(value).context(DeserializationSnafu)?,
        };
        let cursor = response
            .pointer("/response_metadata/next_cursor")
            .and_then(Value::as_str);
        Ok(Self::new(items, cursor))
    }
}

/// Describes one list collection: the method to call, the response field
/// holding the items, and fixed parameters sent with every page.
#[derive(Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Web API method, e.g. `conversations.history`
    pub method: String,
    /// Response field holding the items, e.g. `messages`
    pub field: String,
    /// Fixed query parameters (without cursor or limit)
    pub params: Vec<(String, String)>,
    /// Page size
    pub limit: u32,
    /// Human readable name used in logs
    pub label: String,
}

impl fmt::Debug for PageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageRequest")
            .field("method", &self.method)
            .field("field", &self.field)
            .field("params", &self.params)
            .field("limit", &self.limit)
            .finish()
    }
}

impl PageRequest {
    pub fn new(method: impl Into<String>, field: impl Into<String>) -> Self {
        let method = method.into();
        let field = field.into();
        Self {
            label: field.clone(),
            method,
            field,
            params: Vec::new(),
            limit: DEFAULT_PAGE_LIMIT,
        }
    }

    /// Adds a fixed query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Sets the page size.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the name used in log messages.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Builds the query for one page.
    /// Any cursor or limit in the fixed parameters is replaced, not duplicated.
    pub fn query(&self, cursor: Option<&str>) -> Vec<(String, String)> {
        let mut query: Vec<(String, String)> = self
            .params
            .iter()
            .filter(|(key, _)| key != "cursor" && key != "limit")
            .cloned()
            .collect();
        query.push(("limit".to_string(), self.limit.to_string()));
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            query.push(("cursor".to_string(), cursor.to_string()));
        }
        query
    }
}

/// Completeness of one unit of work.
#[derive(Debug)]
pub enum Outcome {
    /// Every page was fetched.
    Complete,
    /// Some pages were fetched before `cause` stopped the collection.
    Partial(SlackError),
    /// The first request failed; nothing was fetched.
    Failed(SlackError),
}

impl Outcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The error that ended the collection early, if any.
    pub fn cause(&self) -> Option<&SlackError> {
        match self {
            Self::Complete => None,
            Self::Partial(cause) | Self::Failed(cause) => Some(cause),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial(_) => "partial",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cause() {
            None => f.write_str(self.as_str()),
            Some(cause) => write!(f, "{} ({cause})", self.as_str()),
        }
    }
}

/// Items gathered from all pages of a collection, and whether the
/// collection finished.
#[derive(Debug)]
pub struct Collected<T> {
    pub items: Vec<T>,
    pub outcome: Outcome,
    /// Number of pages fetched successfully
    pub pages: usize,
}

impl<T> Collected<T> {
    pub fn is_complete(&self) -> bool {
        self.outcome.is_complete()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

/// Fetches every page of a collection.
///
/// `fetch` is called with `None` for the first page, then with each cursor
/// the platform returns, strictly one page at a time. Collection ends when a
/// page has no cursor. A cursor that was already requested also ends the
/// collection, as `Outcome::Partial`.
///
/// Errors are not returned: they are logged and recorded in the outcome,
/// and the items fetched before the error are kept. There is no retry.
pub async fn collect_pages<T, F, Fut>(label: &str, mut fetch: F) -> Collected<T>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    info!("Fetching {label}...");
    let mut items = Vec::new();
    let mut pages = 0usize;
    let mut cursor: Option<String> = None;
    let mut requested: HashSet<String> = HashSet::new();

    loop {
        let page = match fetch(cursor.clone()).await {
            Ok(page) => page,
            Err(e) => {
                error!(label, pages, fetched = items.len(), "error fetching {label}: {e}");
                let outcome = if pages == 0 {
                    Outcome::Failed(e)
                } else {
                    Outcome::Partial(e)
                };
                return Collected {
                    items,
                    outcome,
                    pages,
                };
            }
        };
        pages += 1;
        items.extend(page.items);

        let Some(next) = page.next_cursor else {
            break;
        };
        if !requested.insert(next.clone()) {
            warn!(label, cursor = %next, "cursor repeated; stopping after {pages} pages");
            return Collected {
                items,
                outcome: Outcome::Partial(SlackError::CursorCycle { cursor: next }),
                pages,
            };
        }
        debug!(label, pages, "Fetching more...");
        cursor = Some(next);
    }

    info!("Fetched {} {label}", items.len());
    Collected {
        items,
        outcome: Outcome::Complete,
        pages,
    }
}
