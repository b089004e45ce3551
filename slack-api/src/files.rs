//! # File attachments
//!
//! Slack messages carry file objects whose URLs only resolve with the
//! workspace token. This module names every URL-bearing field the exporter
//! understands, and what may be done with each.
//!
//! ```rust
//! use slack_api::files::UrlRole;
//!
//! let role = UrlRole::classify("url_private_download").unwrap();
//! assert!(role.is_linkable());
//! assert!(!role.is_materializable());
//! assert_eq!(UrlRole::classify("thumb_360_w"), None);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role of a URL-bearing field on a file object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlRole {
    /// Full-resolution file, `url_private`
    Primary,
    /// Same file served with a download disposition, `url_private_download`
    Download,
    /// A rendered preview; the variant name is the key suffix after `thumb_`
    Thumbnail(&'static str),
}

/// Every recognised URL-bearing key. Keys not listed here are metadata,
/// whatever their value looks like.
pub const URL_FIELDS: &[(&str, UrlRole)] = &[
    ("url_private", UrlRole::Primary),
    ("url_private_download", UrlRole::Download),
    ("thumb_64", UrlRole::Thumbnail("64")),
    ("thumb_80", UrlRole::Thumbnail("80")),
    ("thumb_160", UrlRole::Thumbnail("160")),
    ("thumb_360", UrlRole::Thumbnail("360")),
    ("thumb_360_gif", UrlRole::Thumbnail("360_gif")),
    ("thumb_480", UrlRole::Thumbnail("480")),
    ("thumb_480_gif", UrlRole::Thumbnail("480_gif")),
    ("thumb_720", UrlRole::Thumbnail("720")),
    ("thumb_800", UrlRole::Thumbnail("800")),
    ("thumb_960", UrlRole::Thumbnail("960")),
    ("thumb_1024", UrlRole::Thumbnail("1024")),
    ("thumb_gif", UrlRole::Thumbnail("gif")),
    ("thumb_pdf", UrlRole::Thumbnail("pdf")),
    ("thumb_video", UrlRole::Thumbnail("video")),
];

/// Suffix of the field recording where a materialized copy was stored.
pub const LOCAL_FILE_SUFFIX: &str = "_file";

impl UrlRole {
    /// Looks up the role for a file object key.
    pub fn classify(key: &str) -> Option<Self> {
        URL_FIELDS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, role)| *role)
    }

    /// May carry a public-link token. True for every role.
    pub fn is_linkable(self) -> bool {
        true
    }

    /// Worth downloading. Download variants duplicate the primary file.
    pub fn is_materializable(self) -> bool {
        !matches!(self, Self::Download)
    }
}

/// A URL-bearing field found on a file object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlField<'a> {
    pub key: &'a str,
    pub role: UrlRole,
    pub url: &'a str,
}

impl UrlField<'_> {
    /// Name of the field recording the local copy of this url.
    pub fn local_file_key(&self) -> String {
        format!("{}{LOCAL_FILE_SUFFIX}", self.key)
    }
}

/// A file object attached to a message.
///
/// All fields are kept as received. Typed accessors cover the ones the
/// exporter reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct FileAttachment {
    pub fields: Map<String, Value>,
}

impl FileAttachment {
    pub fn id(&self) -> Option<&str> {
        self.str_field("id")
    }

    /// Recognised URL fields holding `https://` strings, in record order.
    pub fn url_fields(&self) -> impl Iterator<Item = UrlField<'_>> {
        self.fields.iter().filter_map(|(key, value)| {
            let role = UrlRole::classify(key)?;
            let url = value.as_str().filter(|s| s.starts_with("https://"))?;
            Some(UrlField {
                key: key.as_str(),
                role,
                url,
            })
        })
    }

    /// Returns a copy with the given fields set. Existing keys keep their
    /// position; new keys are appended.
    pub fn with_fields(&self, updates: impl IntoIterator<Item = (String, Value)>) -> Self {
        let mut fields = self.fields.clone();
        for (key, value) in updates {
            fields.insert(key, value);
        }
        Self { fields }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}
