/*
 * slackback - Slack workspace backup to S3
 * github.com/stevelr/slackback
 *
 * SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
 * SPDX-License-Identifier: Apache-2.0
 */
//! Point-in-time export of a Slack workspace.
//!
//! - [`backup::run_backup`] walks users, channels, members and history
//!   through any [`slack_api::client::SlackApi`]
//! - [`rewrite`] links or downloads attached files
//! - [`archive::ArchiveWriter`] writes the export tree
//! - [`ship::StorageShipper`] uploads it under one timestamp prefix, to
//!   [`s3::S3Store`] or any other [`ship::ObjectStore`]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![warn(clippy::default_trait_access)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::implicit_clone)]
#![warn(clippy::match_same_arms)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::redundant_closure)]
#![warn(clippy::uninlined_format_args)]
#![warn(clippy::unused_async)]

pub mod archive;
pub mod backup;
pub mod rewrite;
pub mod s3;
pub mod ship;
