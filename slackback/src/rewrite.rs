//! File reference rewriting.
//!
//! Slack file urls only resolve with the workspace token. Before a channel's
//! messages are archived, each recognised url field on each attachment can be
//!  - linked: the url gets a `t=<file token>` parameter, the form Slack uses in
//!    its own public exports
//!  - materialized: the file is downloaded into the channel's directory and
//!    the relative path recorded next to the url as `<key>_file`
//!
//! Both are off unless configured. Rewriting builds new message values; the
//! fetched messages are not modified.
use std::{collections::HashSet, path::PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use slack_api::prelude::*;
use tracing::{debug, info};

use crate::archive::ArchiveWriter;

/// Logical name of a channel's message artifact.
pub const CHANNEL_INDEX_NAME: &str = "all.json";

/// Name used when a url has no usable last path segment.
const FALLBACK_FILE_NAME: &str = "file";

/// Run-wide rewrite settings.
#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    /// Public file token. Enables linking.
    pub file_token: Option<SecretToken>,
    /// Download files into the archive.
    pub download: bool,
}

impl RewriteOptions {
    pub fn is_active(&self) -> bool {
        self.download || self.file_token.is_some()
    }

    /// Verbs for the summary line, e.g. "Downloaded & Linked"
    fn verbs(&self) -> String {
        let mut verbs = Vec::new();
        if self.download {
            verbs.push("Downloaded");
        }
        if self.file_token.is_some() {
            verbs.push("Linked");
        }
        verbs.join(" & ")
    }
}

/// Splits a file name into base and extension, at the last `.` that is not
/// part of a leading run of dots. The extension keeps its dot.
///
/// ```
/// use slackback::rewrite::split_extension;
///
/// assert_eq!(split_extension("a.tar.gz"), ("a.tar", ".gz"));
/// assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
/// assert_eq!(split_extension("README"), ("README", ""));
/// ```
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if name[..dot].chars().any(|ch| ch != '.') => name.split_at(dot),
        _ => (name, ""),
    }
}

/// File names already used within one channel directory.
#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    used: HashSet<String>,
}

impl NameRegistry {
    /// Creates a registry with names that must never be handed out.
    pub fn new<S: Into<String>>(reserved: impl IntoIterator<Item = S>) -> Self {
        Self {
            used: reserved.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `name` if unused, otherwise the first of `base_0.ext`,
    /// `base_1.ext`, ... that is unused. The returned name is then taken.
    pub fn claim(&mut self, name: &str) -> String {
        let mut candidate = name.to_string();
        if self.used.contains(&candidate) {
            let (base, ext) = split_extension(name);
            let mut n = 0usize;
            loop {
                candidate = format!("{base}_{n}{ext}");
                if !self.used.contains(&candidate) {
                    break;
                }
                n += 1;
            }
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

/// Splits a url into the part before the query, the query, and the fragment
/// (with its `#`).
fn split_url(url: &str) -> (&str, Option<&str>, &str) {
    let (rest, fragment) = match url.find('#') {
        Some(hash) => url.split_at(hash),
        None => (url, ""),
    };
    match rest.split_once('?') {
        Some((base, query)) => (base, Some(query), fragment),
        None => (rest, None, fragment),
    }
}

/// Returns `url` with `t=<token>` appended to its query. An existing `t`
/// pair is dropped first; every other byte of the url is kept.
pub fn token_link(url: &str, token: &str) -> String {
    let (base, query, fragment) = split_url(url);
    let mut pairs: Vec<&str> = query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty() && *pair != "t" && !pair.starts_with("t="))
        .collect();
    let token_pair = format!("t={token}");
    pairs.push(&token_pair);
    format!("{base}?{}{fragment}", pairs.join("&"))
}

/// Last path segment of a file url, used as the local file name.
pub fn file_name_from_url(url: &str) -> String {
    let (base, _, _) = split_url(url);
    let path = base.split_once("://").map_or(base, |(_, rest)| rest);
    path.split_once('/')
        .and_then(|(_, path)| path.rsplit('/').next())
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .unwrap_or(FALLBACK_FILE_NAME)
        .to_string()
}

/// One channel's rewritten messages, with counts.
#[derive(Debug, Clone, Default)]
pub struct ChannelRewrite {
    pub messages: Vec<Message>,
    /// Attachments seen
    pub attachments: usize,
    /// Url fields given a token
    pub linked: usize,
    /// Files stored in the archive
    pub downloaded: usize,
    /// Paths of the stored files
    pub files: Vec<PathBuf>,
}

/// Applies [`RewriteOptions`] to one channel at a time.
#[derive(Debug)]
pub struct FileRewriter<'a, A> {
    api: &'a A,
    archive: &'a ArchiveWriter,
    options: &'a RewriteOptions,
}

impl<'a, A: SlackApi> FileRewriter<'a, A> {
    pub fn new(api: &'a A, archive: &'a ArchiveWriter, options: &'a RewriteOptions) -> Self {
        Self {
            api,
            archive,
            options,
        }
    }

    /// Rewrites file references in `messages`, storing downloads under
    /// `channel_dir`. A failed download aborts the channel.
    pub async fn rewrite_channel(
        &self,
        channel_dir: &str,
        messages: &[Message],
    ) -> Result<ChannelRewrite> {
        let mut result = ChannelRewrite {
            messages: Vec::with_capacity(messages.len()),
            ..ChannelRewrite::default()
        };
        if !self.options.is_active() {
            result.messages = messages.to_vec();
            return Ok(result);
        }

        let mut names = NameRegistry::new([
            CHANNEL_INDEX_NAME.to_string(),
            self.archive.format().artifact_name(CHANNEL_INDEX_NAME),
        ]);
        for message in messages {
            if !message.has_files() {
                result.messages.push(message.clone());
                continue;
            }
            let files = message.files();
            let mut rewritten = Vec::with_capacity(files.len());
            for file in &files {
                result.attachments += 1;
                rewritten.push(
                    self.rewrite_file(channel_dir, file, &mut names, &mut result)
                        .await?,
                );
            }
            result.messages.push(message.with_files(rewritten));
        }

        info!(
            "{} {} files from messages in {channel_dir}",
            self.options.verbs(),
            result.attachments
        );
        Ok(result)
    }

    async fn rewrite_file(
        &self,
        channel_dir: &str,
        file: &FileAttachment,
        names: &mut NameRegistry,
        counts: &mut ChannelRewrite,
    ) -> Result<FileAttachment> {
        let mut updates: Vec<(String, Value)> = Vec::new();
        for field in file.url_fields() {
            if let Some(token) = &self.options.file_token
                && field.role.is_linkable()
            {
                let linked = token_link(field.url, token.expose());
                updates.push((field.key.to_string(), Value::String(linked)));
                counts.linked += 1;
            }
            if self.options.download && field.role.is_materializable() {
                let name = names.claim(&file_name_from_url(field.url));
                debug!(key = field.key, %name, "download");
                let bytes = self
                    .api
                    .download(field.url)
                    .await
                    .with_context(|| format!("failed to download {} for {channel_dir}", field.key))?;
                let rel_path = format!("{channel_dir}/{name}");
                let path = self.archive.write_bytes(&rel_path, &bytes)?;
                updates.push((field.local_file_key(), Value::String(rel_path)));
                counts.downloaded += 1;
                counts.files.push(path);
            }
        }
        Ok(file.with_fields(updates))
    }
}
