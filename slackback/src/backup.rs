//! Workspace snapshot.
//!
//! [`run_backup`] fetches users, channels with their members, and each
//! channel's history, and writes them to the archive:
//!
//! ```text
//! users.json[.bz2]
//! channels.json[.bz2]
//! <channel>/all.json[.bz2]
//! <channel>/<materialized files>
//! ```
//!
//! Platform errors never end the run. Each collection records how far it got
//! in the report, and a channel whose history cannot be fetched or rewritten
//! is left out. Filesystem errors end the run.
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use slack_api::prelude::*;
use tracing::{error, info, warn};

use crate::{
    archive::ArchiveWriter,
    rewrite::{CHANNEL_INDEX_NAME, FileRewriter, RewriteOptions},
};

/// Conversation types included in a backup.
pub const BACKUP_CONVERSATION_TYPES: &[ConversationType] = &[
    ConversationType::PublicChannel,
    ConversationType::PrivateChannel,
];

#[derive(Debug, Clone)]
pub struct BackupSettings {
    /// Page size for list methods
    pub page_size: u32,
    pub rewrite: RewriteOptions,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_LIMIT,
            rewrite: RewriteOptions::default(),
        }
    }
}

/// How far a unit of work got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Complete,
    Partial,
    Failed,
}

impl UnitState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl From<&Outcome> for UnitState {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Complete => Self::Complete,
            Outcome::Partial(_) => Self::Partial,
            Outcome::Failed(_) => Self::Failed,
        }
    }
}

/// Result of one collection or one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    /// e.g. `users`, `members:general`, `messages:general`
    pub unit: String,
    pub state: UnitState,
    /// Items fetched
    pub items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UnitStatus {
    fn from_collected<T>(unit: impl Into<String>, collected: &Collected<T>) -> Self {
        Self {
            unit: unit.into(),
            state: UnitState::from(&collected.outcome),
            items: collected.len(),
            error: collected.outcome.cause().map(ToString::to_string),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == UnitState::Complete
    }
}

/// What a backup run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupReport {
    /// JSON artifacts: users, channels, then one per channel backed up
    pub artifacts: Vec<PathBuf>,
    /// Materialized attachment files
    pub files: Vec<PathBuf>,
    pub units: Vec<UnitStatus>,
}

impl BackupReport {
    /// Units that did not finish.
    pub fn incomplete(&self) -> impl Iterator<Item = &UnitStatus> {
        self.units.iter().filter(|unit| !unit.is_complete())
    }

    /// Every path to ship, artifacts first.
    pub fn upload_paths(&self) -> Vec<PathBuf> {
        self.artifacts.iter().chain(&self.files).cloned().collect()
    }

    fn record<T>(&mut self, unit: impl Into<String>, collected: &Collected<T>) {
        self.units.push(UnitStatus::from_collected(unit, collected));
    }
}

/// Exports the workspace into `archive`.
pub async fn run_backup<A: SlackApi>(
    api: &A,
    archive: &ArchiveWriter,
    settings: &BackupSettings,
) -> Result<BackupReport> {
    let mut report = BackupReport::default();

    // users
    let users = api
        .collect::<User>(&users_request().limit(settings.page_size))
        .await;
    report.record("users", &users);
    report
        .artifacts
        .push(archive.write_json(&users.items, "users.json")?);

    // channels, each rebuilt with its member list
    let channels = api
        .collect::<Channel>(&channels_request(BACKUP_CONVERSATION_TYPES).limit(settings.page_size))
        .await;
    report.record("channels", &channels);
    let mut enriched = Vec::with_capacity(channels.len());
    for channel in channels.into_items() {
        let members = api
            .collect::<String>(&members_request(&channel).limit(settings.page_size))
            .await;
        report.record(format!("members:{}", channel.label()), &members);
        enriched.push(channel.with_members(members.into_items()));
    }
    report
        .artifacts
        .push(archive.write_json(&enriched, "channels.json")?);

    // per-channel history
    let rewriter = FileRewriter::new(api, archive, &settings.rewrite);
    for channel in &enriched {
        backup_channel(api, archive, &rewriter, settings, channel, &mut report).await?;
    }

    info!(
        artifacts = report.artifacts.len(),
        files = report.files.len(),
        incomplete = report.incomplete().count(),
        "backup finished"
    );
    Ok(report)
}

async fn backup_channel<A: SlackApi>(
    api: &A,
    archive: &ArchiveWriter,
    rewriter: &FileRewriter<'_, A>,
    settings: &BackupSettings,
    channel: &Channel,
    report: &mut BackupReport,
) -> Result<()> {
    let unit = format!("messages:{}", channel.label());
    let messages = api
        .collect::<Message>(&history_request(channel).limit(settings.page_size))
        .await;
    let mut status = UnitStatus::from_collected(unit, &messages);
    if messages.outcome.is_failed() {
        error!(channel = channel.label(), "skipping channel: {}", messages.outcome);
        report.units.push(status);
        return Ok(());
    }
    if !messages.is_complete() {
        warn!(channel = channel.label(), "history incomplete: {}", messages.outcome);
    }

    let dir = channel.dir_name();
    let rewritten = match rewriter.rewrite_channel(&dir, &messages.items).await {
        Ok(rewritten) => rewritten,
        Err(e) => {
            error!(channel = channel.label(), "skipping channel: {e:#}");
            status.state = UnitState::Failed;
            status.error = Some(format!("{e:#}"));
            report.units.push(status);
            return Ok(());
        }
    };

    let path = archive.write_json(&rewritten.messages, &format!("{dir}/{CHANNEL_INDEX_NAME}"))?;
    report.artifacts.push(path);
    report.files.extend(rewritten.files);
    report.units.push(status);
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use slack_api::mock::{MockFailure, MockSlack};

    use super::*;
    use crate::archive::ArchiveFormat;

    const LIST: &str = "conversations.list";
    const TYPES: (&str, &str) = ("types", "public_channel,private_channel");

    #[tokio::test]
    async fn users_failure_still_writes_users_artifact() {
        let temp = tempfile::tempdir().unwrap();
        let archive = ArchiveWriter::new(temp.path(), ArchiveFormat::Plain);
        let slack = MockSlack::new()
            .fail_page("users.list", &[], 0, MockFailure::Unauthorized)
            .collection(LIST, &[TYPES], vec![vec![]]);

        let report = run_backup(&slack, &archive, &BackupSettings::default())
            .await
            .unwrap();

        assert_eq!(
            report.artifacts,
            vec![
                temp.path().join("users.json"),
                temp.path().join("channels.json")
            ]
        );
        assert_eq!(archive.read_json(&report.artifacts[0]).unwrap(), json!([]));
        let incomplete: Vec<&str> = report.incomplete().map(|u| u.unit.as_str()).collect();
        assert_eq!(incomplete, vec!["users"]);
        assert_eq!(report.units[0].state, UnitState::Failed);
    }

    #[tokio::test]
    async fn page_size_is_sent() {
        let temp = tempfile::tempdir().unwrap();
        let archive = ArchiveWriter::new(temp.path(), ArchiveFormat::Plain);
        let slack = MockSlack::new();
        let settings = BackupSettings {
            page_size: 50,
            ..BackupSettings::default()
        };
        run_backup(&slack, &archive, &settings).await.unwrap();
        for request in slack.requests() {
            assert!(
                request
                    .query
                    .contains(&("limit".to_string(), "50".to_string()))
            );
        }
    }

    #[tokio::test]
    async fn partial_history_is_written_and_reported() {
        let temp = tempfile::tempdir().unwrap();
        let archive = ArchiveWriter::new(temp.path(), ArchiveFormat::Plain);
        let slack = MockSlack::new()
            .collection(
                LIST,
                &[TYPES],
                vec![vec![json!({"id": "C1", "name": "general"})]],
            )
            .collection(
                "conversations.history",
                &[("channel", "C1")],
                vec![vec![json!({"ts": "2"})], vec![json!({"ts": "1"})]],
            )
            .fail_page(
                "conversations.history",
                &[("channel", "C1")],
                1,
                MockFailure::RateLimited,
            );

        let report = run_backup(&slack, &archive, &BackupSettings::default())
            .await
            .unwrap();

        assert_eq!(report.artifacts.len(), 3);
        assert_eq!(
            archive.read_json(&report.artifacts[2]).unwrap(),
            json!([{"ts": "2"}])
        );
        let history = report
            .units
            .iter()
            .find(|u| u.unit == "messages:general")
            .unwrap();
        assert_eq!(history.state, UnitState::Partial);
        assert_eq!(history.items, 1);
        assert!(history.error.as_deref().unwrap().contains("Rate limited"));
    }

    #[tokio::test]
    async fn rewrite_failure_skips_channel() {
        let temp = tempfile::tempdir().unwrap();
        let archive = ArchiveWriter::new(temp.path(), ArchiveFormat::Plain);
        let slack = MockSlack::new()
            .collection(
                LIST,
                &[TYPES],
                vec![vec![json!({"id": "C1", "name": "general"})]],
            )
            .collection(
                "conversations.history",
                &[("channel", "C1")],
                vec![vec![json!({
                    "ts": "1",
                    "files": [{"id": "F1", "url_private": "https://files.slack.com/gone.png"}]
                })]],
            );
        let settings = BackupSettings {
            rewrite: RewriteOptions {
                file_token: None,
                download: true,
            },
            ..BackupSettings::default()
        };

        let report = run_backup(&slack, &archive, &settings).await.unwrap();

        assert_eq!(report.artifacts.len(), 2);
        assert!(!temp.path().join("general/all.json").exists());
        let history = report.units.last().unwrap();
        assert_eq!(history.unit, "messages:general");
        assert_eq!(history.state, UnitState::Failed);
    }
}
