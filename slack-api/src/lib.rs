/*
 * Slack Web API client for workspace export
 * github.com/stevelr/slackback
 *
 * SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
 * SPDX-License-Identifier: Apache-2.0
 */
//! # Slack Web API client
//!
//! The read side of a Slack workspace export.
//!
//! ## Features
//!
//! - cursor pagination with explicit completeness ([`paged::Outcome`])
//! - users, channels, channel members, and channel history
//! - file attachments with a declared table of url fields
//! - authenticated file downloads
//! - http metrics
//! - in-memory [`mock::MockSlack`] for tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slack_api::prelude::*;
//! # async fn example() -> Result<(), SlackError> {
//!
//! let client = SlackClient::new("xoxp-...")?;
//!
//! let users = client.collect::<User>(&users_request()).await;
//! println!("{} users ({})", users.len(), users.outcome);
//!
//! let channels = client
//!     .collect::<Channel>(&channels_request(&[ConversationType::PublicChannel]))
//!     .await;
//! for channel in &channels.items {
//!     let history = client.collect::<Message>(&history_request(channel)).await;
//!     for message in &history.items {
//!         for file in message.files() {
//!             for field in file.url_fields() {
//!                 println!("{} {} {}", channel.label(), field.key, field.url);
//!             }
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Notes
//!
//! - Collections never return `Err`. A collection that stops early returns
//!   the items fetched so far, with `Outcome::Partial` or `Outcome::Failed`
//!   carrying the cause.
//! - Requests are sent once. Rate limits surface as `SlackError::RateLimited`.
//! - Users, channels, messages and files keep every field the platform
//!   returned, in order, so they can be written back out unchanged.
//!
#![allow(clippy::missing_errors_doc)] // pedantic
#![allow(clippy::must_use_candidate)] // pedantic
#![warn(clippy::default_trait_access)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::implicit_clone)]
#![warn(clippy::match_same_arms)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::redundant_closure)]
#![warn(clippy::uninlined_format_args)]
#![warn(clippy::unused_async)]

pub mod client;
pub mod conversations;
pub mod error;
pub mod files;
pub mod http_client;
#[doc(hidden)]
pub mod mock;
pub mod paged;
pub mod token;
pub mod users;

/// Result type alias using `SlackError` as the default error.
pub type Result<T, E = crate::error::SlackError> = std::result::Result<T, E>;

/// Prelude module - import the common types with `use slack_api::prelude::*;`
pub mod prelude {
    pub use super::DEFAULT_SLACK_API_URL;
    pub use crate::error::*;
    pub use crate::{
        // Client
        client::{ClientConfig, SlackApi, SlackClient},
        // Channels and messages
        conversations::{
            Channel, ConversationType, Message, channels_request, history_request,
            members_request,
        },
        // File attachments
        files::{FileAttachment, LOCAL_FILE_SUFFIX, URL_FIELDS, UrlField, UrlRole},
        // HTTP metrics
        http_client::HttpMetricsSnapshot,
        // Pagination
        paged::{Collected, DEFAULT_PAGE_LIMIT, Outcome, Page, PageRequest, collect_pages},
        // Tokens
        token::SecretToken,
        // Users
        users::{User, users_request},
    };
}

/// Default Web API endpoint
pub const DEFAULT_SLACK_API_URL: &str = config::DEFAULT_SLACK_API_URL;

pub(crate) mod config {
    /// Environment variable to override the Web API endpoint
    pub const SLACK_API_URL_ENV: &str = "SLACK_API_URL";

    /// Web API endpoint
    pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";
}
