use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum, builder::FalseyValueParser, error::ErrorKind};
use serde::Serialize;
use slack_api::prelude::*;
use slackback::{
    archive::{ArchiveFormat, ArchiveWriter},
    backup::{BackupReport, BackupSettings, UnitStatus, run_backup},
    rewrite::RewriteOptions,
    s3::{DEFAULT_REGION, S3Config, S3Store},
    ship::{ShipReport, StorageShipper},
};
use tracing::{info, warn};

const DEFAULT_BACKUP_DIR: &str = "/tmp/backup";

#[derive(Parser, Debug)]
#[command(name = "slackback")]
#[command(author, version, about = "Slack workspace backup to S3", long_about = None)]
pub struct Cli {
    /// Bot or user token. A user token also exports the user's private channels
    #[arg(long, env = "TOKEN", hide_env_values = true)]
    pub token: String,

    /// Public file token. Adds `t=<token>` to file urls in exported messages
    #[arg(long, env = "FILE_TOKEN", hide_env_values = true)]
    pub file_token: Option<String>,

    /// Download attached files into the backup
    #[arg(long, env = "DOWNLOAD", value_parser = FalseyValueParser::new())]
    pub download: bool,

    /// Destination bucket
    #[arg(long, env = "STORAGE_LOC", required_unless_present = "no_upload")]
    pub storage_loc: Option<String>,

    /// Profile in the shared AWS credentials file
    #[arg(long, env = "PROFILE")]
    pub profile: Option<String>,

    /// Bucket region
    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Custom S3 endpoint url (path-style addressing)
    #[arg(long, env = "S3_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Slack Web API url
    #[arg(long, env = "SLACK_API_URL", default_value = DEFAULT_SLACK_API_URL)]
    pub api_url: String,

    /// Local scratch directory for the export
    #[arg(long, env = "BACKUP_DIR", value_name = "DIR", default_value = DEFAULT_BACKUP_DIR)]
    pub backup_dir: PathBuf,

    /// Items requested per page
    #[arg(long, env = "SLACK_PAGE_SIZE", default_value_t = DEFAULT_PAGE_LIMIT,
        value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub page_size: u32,

    /// Write plain json instead of .json.bz2
    #[arg(long)]
    pub no_compress: bool,

    /// Stop after the local export
    #[arg(long)]
    pub no_upload: bool,

    /// Print machine-readable output
    #[arg(long)]
    pub json: bool,

    /// Verbose mode (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Color mode for log output
    #[arg(long, value_enum, default_value_t = ColorArg::Auto)]
    pub color: ColorArg,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ColorArg {
    Auto,
    Always,
    Never,
}

impl Cli {
    fn archive_format(&self) -> ArchiveFormat {
        if self.no_compress {
            ArchiveFormat::Plain
        } else {
            ArchiveFormat::Bzip2
        }
    }

    fn backup_settings(&self) -> BackupSettings {
        BackupSettings {
            page_size: self.page_size,
            rewrite: RewriteOptions {
                file_token: self
                    .file_token
                    .as_deref()
                    .filter(|token| !token.is_empty())
                    .map(SecretToken::new),
                download: self.download,
            },
        }
    }

    fn s3_config(&self) -> Option<S3Config> {
        let bucket = self.storage_loc.as_deref()?;
        Some(S3Config {
            region: Some(self.region.clone()),
            endpoint: self.endpoint.clone(),
            profile: self.profile.clone(),
            ..S3Config::new(bucket)
        })
    }
}

pub fn parse_cli_from_env() -> Result<Cli> {
    match Cli::try_parse() {
        Ok(cli) => Ok(cli),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => Err(anyhow!(e.to_string())),
    }
}

pub fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{text}");
    Ok(())
}

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    backup_dir: &'a PathBuf,
    format: &'static str,
    #[serde(flatten)]
    backup: &'a BackupReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    upload: Option<&'a ShipReport>,
    http: String,
}

pub async fn run(cli: Cli) -> Result<()> {
    let client = SlackClient::with_config(
        ClientConfig::new(cli.token.as_str()).base_url(cli.api_url.clone()),
    )?;

    // resolve credentials before the export so a bad profile fails fast
    let store = if cli.no_upload {
        None
    } else {
        let config = cli
            .s3_config()
            .ok_or_else(|| anyhow!("--storage-loc is required unless --no-upload"))?;
        Some(S3Store::new(&config).context("S3 configuration")?)
    };

    let archive = ArchiveWriter::new(&cli.backup_dir, cli.archive_format());
    let report = run_backup(&client, &archive, &cli.backup_settings())
        .await
        .with_context(|| format!("backup to {} failed", cli.backup_dir.display()))?;
    for unit in report.incomplete() {
        warn!(
            "{} {}: {}",
            unit.unit,
            unit.state.as_str(),
            unit.error.as_deref().unwrap_or_default()
        );
    }

    let upload = match &store {
        Some(store) => Some(
            StorageShipper::new(store, &archive)
                .ship(&report.upload_paths())
                .await?,
        ),
        None => None,
    };

    let http = client.http_metrics().to_string();
    info!("http: {http}");

    if cli.json {
        return emit_json(&RunReport {
            backup_dir: &cli.backup_dir,
            format: archive.format().as_str(),
            backup: &report,
            upload: upload.as_ref(),
            http,
        });
    }
    print_summary(&cli, &report, upload.as_ref());
    Ok(())
}

fn print_summary(cli: &Cli, report: &BackupReport, upload: Option<&ShipReport>) {
    println!(
        "Exported {} artifacts and {} files to {}",
        report.artifacts.len(),
        report.files.len(),
        cli.backup_dir.display()
    );
    let incomplete: Vec<&UnitStatus> = report.incomplete().collect();
    if !incomplete.is_empty() {
        println!("Incomplete:");
        for unit in incomplete {
            println!("  {:<10} {}", unit.state.as_str(), unit.unit);
        }
    }
    if let (Some(upload), Some(bucket)) = (upload, cli.storage_loc.as_deref()) {
        println!(
            "Uploaded {} objects to s3://{bucket}/{}/",
            upload.keys.len(),
            upload.prefix
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from([
            "slackback",
            "--token",
            "xoxp-1",
            "--storage-loc",
            "bucket",
        ])
        .unwrap();
        assert_eq!(cli.region, "eu-west-1");
        assert_eq!(cli.page_size, 200);
        assert_eq!(cli.backup_dir, PathBuf::from("/tmp/backup"));
        assert_eq!(cli.archive_format(), ArchiveFormat::Bzip2);
        assert!(!cli.backup_settings().rewrite.is_active());

        let s3 = cli.s3_config().unwrap();
        assert_eq!(s3.bucket, "bucket");
        assert_eq!(s3.region(), "eu-west-1");
    }

    #[test]
    fn storage_loc_required_unless_no_upload() {
        let err = Cli::try_parse_from(["slackback", "--token", "t"]).unwrap_err();
        assert!(err.to_string().contains("--storage-loc"));

        let cli = Cli::try_parse_from(["slackback", "--token", "t", "--no-upload"]).unwrap();
        assert!(cli.s3_config().is_none());
    }

    #[test]
    fn rewrite_options_from_flags() {
        let cli = Cli::try_parse_from([
            "slackback",
            "--token",
            "t",
            "--no-upload",
            "--download",
            "--file-token",
            "pub",
            "--no-compress",
            "--page-size",
            "50",
        ])
        .unwrap();
        let settings = cli.backup_settings();
        assert!(settings.rewrite.download);
        assert_eq!(
            settings.rewrite.file_token.as_ref().map(SecretToken::expose),
            Some("pub")
        );
        assert_eq!(settings.page_size, 50);
        assert_eq!(cli.archive_format(), ArchiveFormat::Plain);
    }

    #[test]
    fn page_size_out_of_range() {
        assert!(
            Cli::try_parse_from(["slackback", "--token", "t", "--no-upload", "--page-size", "0"])
                .is_err()
        );
    }

    #[test]
    fn parse_color_never() {
        let cli =
            Cli::try_parse_from(["slackback", "--token", "t", "--no-upload", "--color", "never"])
                .unwrap();
        assert_eq!(cli.color, ColorArg::Never);
    }
}
