//! # Channels and messages
//!
//! Request descriptions for the `conversations.*` list methods, and the
//! `Channel` and `Message` records they return.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slack_api::prelude::*;
//!
//! # async fn example(client: &SlackClient) {
//! let types = [ConversationType::PublicChannel, ConversationType::PrivateChannel];
//! let channels = client.collect::<Channel>(&channels_request(&types)).await;
//! for channel in &channels.items {
//!     let members = client.collect::<String>(&members_request(channel)).await;
//!     let channel = channel.with_members(members.items);
//!     let messages = client.collect::<Message>(&history_request(&channel)).await;
//!     println!("{} {} messages", channel.label(), messages.len());
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{files::FileAttachment, paged::PageRequest};

/// Conversation kinds accepted by `conversations.list`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationType {
    PublicChannel,
    PrivateChannel,
}

/// Directory name for a channel with neither name nor id.
const UNNAMED_CHANNEL: &str = "unnamed";

/// A channel, as returned by `conversations.list`.
///
/// The record is kept as received; [`with_members`](Channel::with_members)
/// adds the member list.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Channel {
    pub fields: Map<String, Value>,
}

impl Channel {
    pub fn id(&self) -> Option<&str> {
        self.str_field("id")
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    /// The channel name, or the id if the channel has no name.
    pub fn label(&self) -> &str {
        self.name()
            .filter(|name| !name.is_empty())
            .or(self.id())
            .unwrap_or(UNNAMED_CHANNEL)
    }

    /// Name of the channel's directory in an export: [`label`](Channel::label)
    /// with path separators replaced.
    pub fn dir_name(&self) -> String {
        self.label().replace(['/', '\\'], "_")
    }

    /// Returns a copy of this channel carrying the given member ids. An
    /// existing `members` field keeps its position.
    pub fn with_members(&self, members: Vec<String>) -> Self {
        let mut fields = self.fields.clone();
        fields.insert("members".to_string(), Value::from(members));
        Self { fields }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// A message from `conversations.history`, kept as received.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Message {
    pub fields: Map<String, Value>,
}

impl Message {
    /// Message timestamp, which is also its id within the channel.
    pub fn ts(&self) -> Option<&str> {
        self.fields.get("ts").and_then(Value::as_str)
    }

    /// File objects in the `files` array, in order. Entries that are not
    /// objects are skipped.
    pub fn files(&self) -> Vec<FileAttachment> {
        self.fields
            .get("files")
            .and_then(Value::as_array)
            .map(|files| {
                files
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|fields| FileAttachment {
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_files(&self) -> bool {
        self.fields
            .get("files")
            .and_then(Value::as_array)
            .is_some_and(|files| files.iter().any(Value::is_object))
    }

    /// Returns a copy of this message with the file objects of `files`
    /// replaced, in order, by `files`. Other entries and fields are kept in
    /// place.
    pub fn with_files(&self, files: Vec<FileAttachment>) -> Self {
        let mut fields = self.fields.clone();
        let mut replacements = files.into_iter();
        match fields.get_mut("files") {
            Some(Value::Array(entries)) => {
                for entry in entries.iter_mut().filter(|entry| entry.is_object()) {
                    if let Some(file) = replacements.next() {
                        *entry = Value::Object(file.fields);
                    }
                }
            }
            _ => {
                let files = replacements.map(|file| Value::Object(file.fields)).collect();
                fields.insert("files".to_string(), Value::Array(files));
            }
        }
        Self { fields }
    }
}

/// `conversations.list` for the given conversation types.
pub fn channels_request(types: &[ConversationType]) -> PageRequest {
    let types = types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    PageRequest::new("conversations.list", "channels")
        .param("types", types)
        .label("all channels")
}

/// `conversations.members` for one channel.
pub fn members_request(channel: &Channel) -> PageRequest {
    PageRequest::new("conversations.members", "members")
        .param("channel", channel.id().unwrap_or_default())
        .label(format!("all members in channel {}", channel.label()))
}

/// `conversations.history` for one channel, newest first.
pub fn history_request(channel: &Channel) -> PageRequest {
    PageRequest::new("conversations.history", "messages")
        .param("channel", channel.id().unwrap_or_default())
        .label(format!("all messages from channel {}", channel.label()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn general() -> Channel {
        serde_json::from_value(json!({
            "id": "C1",
            "name": "general",
            "is_private": false,
            "topic": {"value": "hello"},
        }))
        .unwrap()
    }

    #[test]
    fn test_with_members_builds_new_record() {
        let channel = general();
        let enriched = channel.with_members(vec!["U1".into(), "U2".into()]);
        assert!(channel.fields.get("members").is_none());
        assert_eq!(enriched.fields["members"], json!(["U1", "U2"]));

        let keys: Vec<&str> = enriched.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "name", "is_private", "topic", "members"]);
    }

    #[test]
    fn test_with_members_keeps_existing_position() {
        let channel: Channel =
            serde_json::from_value(json!({"id": "C1", "members": [], "name": "x"})).unwrap();
        let enriched = channel.with_members(vec!["U1".into()]);
        assert_eq!(
            serde_json::to_string(&enriched).unwrap(),
            r#"{"id":"C1","members":["U1"],"name":"x"}"#
        );
    }

    #[test]
    fn test_channel_round_trips_unchanged() {
        let text = r#"{"name":null,"is_archived":false,"id":"C1","purpose":{"value":""}}"#;
        let channel: Channel = serde_json::from_str(text).unwrap();
        assert_eq!(serde_json::to_string(&channel).unwrap(), text);
        assert_eq!(channel.label(), "C1");
    }

    #[test]
    fn test_dir_name() {
        let mut channel = general();
        assert_eq!(channel.dir_name(), "general");
        channel.fields.insert("name".into(), json!("a/b"));
        assert_eq!(channel.dir_name(), "a_b");
        channel.fields.insert("name".into(), json!(""));
        assert_eq!(channel.dir_name(), "C1");
        channel.fields.clear();
        assert_eq!(channel.dir_name(), "unnamed");
    }

    #[test]
    fn test_message_round_trips_unchanged() {
        let text = r#"{"type":"message","files":null,"ts":"1700000000.000100","text":"hi"}"#;
        let message: Message = serde_json::from_str(text).unwrap();
        assert!(!message.has_files());
        assert!(message.files().is_empty());
        assert_eq!(message.ts(), Some("1700000000.000100"));
        assert_eq!(serde_json::to_string(&message).unwrap(), text);
    }

    #[test]
    fn test_message_with_files_replaces_objects_in_place() {
        let message: Message = serde_json::from_value(json!({
            "ts": "1",
            "files": [{"id": "F1"}, "not-a-file", {"id": "F2"}],
            "text": "two files",
        }))
        .unwrap();
        let files = message.files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].id(), Some("F2"));

        let renamed = files
            .iter()
            .map(|file| file.with_fields([("seen".to_string(), json!(true))]))
            .collect();
        let replaced = message.with_files(renamed);
        assert_eq!(
            serde_json::to_string(&replaced).unwrap(),
            r#"{"ts":"1","files":[{"id":"F1","seen":true},"not-a-file",{"id":"F2","seen":true}],"text":"two files"}"#
        );
        // original untouched
        assert_eq!(message.files()[0].fields.get("seen"), None);
    }

    #[test]
    fn test_channels_request_types() {
        let request = channels_request(&[
            ConversationType::PublicChannel,
            ConversationType::PrivateChannel,
        ]);
        assert_eq!(request.method, "conversations.list");
        assert_eq!(
            request.params,
            vec![(
                "types".to_string(),
                "public_channel,private_channel".to_string()
            )]
        );
    }

    #[test]
    fn test_channel_requests_carry_channel_id() {
        let channel = general();
        for request in [members_request(&channel), history_request(&channel)] {
            assert_eq!(
                request.params,
                vec![("channel".to_string(), "C1".to_string())]
            );
            assert!(request.label.ends_with("general"));
        }
    }
}
