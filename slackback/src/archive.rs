//! Local export tree.
//!
//! `ArchiveWriter` owns the scratch root. JSON artifacts are pretty-printed
//! and, by default, bzip2-compressed with a `.bz2` suffix. Materialized files
//! are stored as-is. Writes always replace what was there.
use std::{
    fs,
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use bzip2::{Compression, read::BzDecoder, write::BzEncoder};
use serde::Serialize;
use serde_json::Value;

const BZ2_SUFFIX: &str = ".bz2";

/// Encoding of JSON artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveFormat {
    /// bzip2-compressed JSON, `.json.bz2`
    #[default]
    Bzip2,
    /// plain JSON
    Plain,
}

impl ArchiveFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bzip2 => "bzip2",
            Self::Plain => "plain",
        }
    }

    /// On-disk name for a JSON artifact with the given logical name.
    pub fn artifact_name(self, name: &str) -> String {
        match self {
            Self::Bzip2 => format!("{name}{BZ2_SUFFIX}"),
            Self::Plain => name.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    root: PathBuf,
    format: ArchiveFormat,
}

impl ArchiveWriter {
    pub fn new(root: impl Into<PathBuf>, format: ArchiveFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Serializes `value` to `rel_path` under the root and returns the path
    /// actually written (with `.bz2` appended when compressing).
    pub fn write_json<T: Serialize + ?Sized>(&self, value: &T, rel_path: &str) -> Result<PathBuf> {
        let path = self.root.join(self.format.artifact_name(rel_path));
        create_parent_dirs(&path)?;

        let mut text = serde_json::to_vec_pretty(value)
            .with_context(|| format!("failed to serialize {rel_path}"))?;
        text.push(b'\n');

        let file = fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        match self.format {
            ArchiveFormat::Bzip2 => {
                let mut encoder = BzEncoder::new(BufWriter::new(file), Compression::default());
                encoder
                    .write_all(&text)
                    .with_context(|| format!("failed to compress {}", path.display()))?;
                encoder
                    .finish()
                    .and_then(|mut out| out.flush())
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            ArchiveFormat::Plain => {
                let mut out = BufWriter::new(file);
                out.write_all(&text)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                out.flush()
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
        }
        Ok(path)
    }

    /// Stores raw bytes at `rel_path` under the root.
    pub fn write_bytes(&self, rel_path: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.root.join(rel_path);
        create_parent_dirs(&path)?;
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Path of `path` relative to the root, with `/` separators.
    /// Fails if `path` is not under the root.
    pub fn relative(&self, path: &Path) -> Result<String> {
        let rel = path.strip_prefix(&self.root).map_err(|_| {
            anyhow!(
                "{} is not under archive root {}",
                path.display(),
                self.root.display()
            )
        })?;
        let parts = rel
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>();
        if parts.is_empty() {
            return Err(anyhow!("{} is the archive root", path.display()));
        }
        Ok(parts.join("/"))
    }

    /// Reads a JSON artifact back, decompressing `.bz2` files.
    pub fn read_json(&self, path: &Path) -> Result<Value> {
        let file =
            fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut text = Vec::new();
        let read = if path.to_string_lossy().ends_with(BZ2_SUFFIX) {
            BzDecoder::new(file).read_to_end(&mut text)
        } else {
            io::BufReader::new(file).read_to_end(&mut text)
        };
        read.with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&text).with_context(|| format!("invalid json in {}", path.display()))
    }
}

fn create_parent_dirs(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(parent)
        .with_context(|| format!("failed to create directory {}", parent.display()))
}
