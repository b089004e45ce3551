//! Upload of a finished export.
//!
//! Every object of one run shares a prefix: the local time the upload began,
//! e.g. `2026-10-19T14:03:07.123456`. Objects keep their path relative to the
//! archive root, so `general/all.json.bz2` lands at
//! `<prefix>/general/all.json.bz2`.
use std::{
    future::Future,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::info;

use crate::archive::ArchiveWriter;

/// Format of the run prefix: ISO 8601 local time with microseconds.
pub const RUN_PREFIX_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Destination for archive files.
pub trait ObjectStore {
    /// Uploads the file at `path` as object `key`, replacing any existing object.
    fn put_file(&self, key: &str, path: &Path) -> impl Future<Output = Result<()>>;
}

/// Run prefix for an upload started at `now`.
pub fn run_prefix(now: DateTime<Local>) -> String {
    now.format(RUN_PREFIX_FORMAT).to_string()
}

/// Ships archive files to an [`ObjectStore`].
#[derive(Debug)]
pub struct StorageShipper<'a, S> {
    store: &'a S,
    archive: &'a ArchiveWriter,
}

/// Objects written by one upload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ShipReport {
    pub prefix: String,
    pub keys: Vec<String>,
}

impl<'a, S: ObjectStore> StorageShipper<'a, S> {
    pub fn new(store: &'a S, archive: &'a ArchiveWriter) -> Self {
        Self { store, archive }
    }

    /// Uploads `paths` in order under a prefix taken from the current local
    /// time.
    pub async fn ship(&self, paths: &[PathBuf]) -> Result<ShipReport> {
        self.ship_with_prefix(&run_prefix(Local::now()), paths)
            .await
    }

    /// Uploads `paths` in order under `prefix`. The first failure stops the
    /// upload and is returned.
    pub async fn ship_with_prefix(&self, prefix: &str, paths: &[PathBuf]) -> Result<ShipReport> {
        // every key is computed before anything is sent
        let keys = paths
            .iter()
            .map(|path| -> Result<String> {
                Ok(format!("{prefix}/{}", self.archive.relative(path)?))
            })
            .collect::<Result<Vec<_>>>()?;

        for (path, key) in paths.iter().zip(&keys) {
            self.store
                .put_file(key, path)
                .await
                .with_context(|| format!("failed to upload {}", path.display()))?;
            info!("Uploaded {key}");
        }
        Ok(ShipReport {
            prefix: prefix.to_string(),
            keys,
        })
    }
}

/// [`ObjectStore`] that keeps objects in memory, for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<Vec<(String, Vec<u8>)>>,
    fail_key: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses the object with this key.
    pub fn failing_on(key: impl Into<String>) -> Self {
        Self {
            objects: Mutex::default(),
            fail_key: Some(key.into()),
        }
    }

    /// Stored objects, in upload order.
    pub fn objects(&self) -> Vec<(String, Vec<u8>)> {
        self.objects.lock().clone()
    }

    /// Keys stored, in upload order.
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().iter().map(|(key, _)| key.clone()).collect()
    }
}

impl ObjectStore for MemoryStore {
    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        if self.fail_key.as_deref() == Some(key) {
            bail!("refused {key}");
        }
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        self.objects.lock().push((key.to_string(), bytes));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::archive::ArchiveFormat;

    #[test]
    fn prefix_is_iso_with_microseconds() {
        let now = Local
            .with_ymd_and_hms(2026, 10, 19, 14, 3, 7)
            .unwrap()
            .checked_add_signed(chrono::TimeDelta::microseconds(123_456))
            .unwrap();
        assert_eq!(run_prefix(now), "2026-10-19T14:03:07.123456");
    }

    #[test]
    fn prefix_keeps_fraction_on_whole_seconds() {
        let now = Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(run_prefix(now), "2026-01-02T03:04:05.000000");
    }

    #[tokio::test]
    async fn keys_are_prefix_and_relative_path() {
        let temp = tempfile::tempdir().unwrap();
        let archive = ArchiveWriter::new(temp.path(), ArchiveFormat::Bzip2);
        let users = archive.write_json(&json!([]), "users.json").unwrap();
        let general = archive.write_json(&json!([]), "general/all.json").unwrap();

        let store = MemoryStore::new();
        let report = StorageShipper::new(&store, &archive)
            .ship_with_prefix("2026-10-19T14:03:07.123456", &[users, general])
            .await
            .unwrap();

        assert_eq!(
            store.keys(),
            vec![
                "2026-10-19T14:03:07.123456/users.json.bz2",
                "2026-10-19T14:03:07.123456/general/all.json.bz2",
            ]
        );
        assert_eq!(report.keys, store.keys());
    }

    #[tokio::test]
    async fn path_outside_root_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let archive = ArchiveWriter::new(temp.path().join("root"), ArchiveFormat::Plain);
        let outside = temp.path().join("other.json");
        std::fs::write(&outside, b"{}").unwrap();

        let store = MemoryStore::new();
        let result = StorageShipper::new(&store, &archive)
            .ship_with_prefix("p", &[outside])
            .await;
        assert!(result.is_err());
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn failure_stops_remaining_uploads() {
        let temp = tempfile::tempdir().unwrap();
        let archive = ArchiveWriter::new(temp.path(), ArchiveFormat::Plain);
        let paths = ["a.json", "b.json", "c.json"]
            .iter()
            .map(|name| archive.write_json(&json!({}), name).unwrap())
            .collect::<Vec<_>>();

        let store = MemoryStore::failing_on("p/b.json");
        let err = StorageShipper::new(&store, &archive)
            .ship_with_prefix("p", &paths)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("refused p/b.json"));
        assert_eq!(store.keys(), vec!["p/a.json"]);
    }
}
