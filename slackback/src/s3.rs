//! S3 object store.
//!
//! Uploads are presigned `PUT` requests sent with reqwest. The default endpoint
//! is AWS (`https://s3.<region>.amazonaws.com`, virtual-host addressing); any
//! other endpoint is addressed path-style, which is what MinIO and most other
//! S3-compatible servers expect.
//!
//! Credentials come from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` (and
//! `AWS_SESSION_TOKEN`), or from a profile in the shared credentials file
//! (`AWS_SHARED_CREDENTIALS_FILE`, else `~/.aws/credentials`).
use std::{env, fmt, fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use ini::Ini;
use rusty_s3::actions::S3Action;
use rusty_s3::{Bucket, Credentials, UrlStyle};
use tracing::debug;
use zeroize::Zeroizing;

use crate::ship::ObjectStore;

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "eu-west-1";

/// Validity of presigned urls.
const PRESIGN_DURATION: Duration = Duration::from_secs(3600);

const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub bucket: String,
    /// Defaults to [`DEFAULT_REGION`]
    pub region: Option<String>,
    /// Custom endpoint url. Defaults to AWS for the region.
    pub endpoint: Option<String>,
    /// Profile in the shared credentials file
    pub profile: Option<String>,
}

impl S3Config {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }
}

/// Access key pair, optionally with a session token.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: Zeroizing<String>,
    pub session_token: Option<Zeroizing<String>>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: Zeroizing::new(secret_access_key.into()),
            session_token: None,
        }
    }

    /// Loads credentials.
    ///
    /// With no profile, the `AWS_*` environment variables are used if set,
    /// then the `default` profile. With a profile, only that profile is used.
    pub fn load(profile: Option<&str>) -> Result<Self> {
        if profile.is_none()
            && let Some(credentials) = Self::from_env()
        {
            debug!("using credentials from environment");
            return Ok(credentials);
        }
        let profile = profile.unwrap_or(DEFAULT_PROFILE);
        let path = shared_credentials_path()?;
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read credentials file {}", path.display()))?;
        debug!(profile, path = %path.display(), "using shared credentials");
        parse_credentials_file(&text, profile)
            .with_context(|| format!("failed to parse {}", path.display()))?
            .ok_or_else(|| {
                anyhow!(
                    "profile '{profile}' not found or incomplete in {}",
                    path.display()
                )
            })
    }

    fn from_env() -> Option<Self> {
        let access_key_id = env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        let mut credentials = Self::new(access_key_id, secret_access_key);
        credentials.session_token = env::var("AWS_SESSION_TOKEN").ok().map(Zeroizing::new);
        Some(credentials)
    }

    fn to_rusty(&self) -> Credentials {
        match &self.session_token {
            Some(token) => Credentials::new_with_token(
                self.access_key_id.as_str(),
                self.secret_access_key.as_str(),
                token.as_str(),
            ),
            None => Credentials::new(
                self.access_key_id.as_str(),
                self.secret_access_key.as_str(),
            ),
        }
    }
}

fn shared_credentials_path() -> Result<PathBuf> {
    if let Ok(path) = env::var("AWS_SHARED_CREDENTIALS_FILE") {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".aws").join("credentials"))
}

/// Reads one profile from a shared credentials file. Returns `None` if the
/// profile is missing or lacks a key pair.
fn parse_credentials_file(text: &str, profile: &str) -> Result<Option<AwsCredentials>> {
    let ini = Ini::load_from_str(text)?;
    let Some(section) = ini.section(Some(profile)) else {
        return Ok(None);
    };
    let (Some(access_key_id), Some(secret_access_key)) = (
        section.get("aws_access_key_id"),
        section.get("aws_secret_access_key"),
    ) else {
        return Ok(None);
    };
    let mut credentials = AwsCredentials::new(access_key_id, secret_access_key);
    credentials.session_token = section
        .get("aws_session_token")
        .map(|token| Zeroizing::new(token.to_string()));
    Ok(Some(credentials))
}

pub struct S3Store {
    bucket: Bucket,
    credentials: Credentials,
    client: reqwest::Client,
}

impl fmt::Debug for S3Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket.name())
            .field("endpoint", &self.bucket.base_url().as_str())
            .finish_non_exhaustive()
    }
}

impl S3Store {
    /// Creates a store, loading credentials for `config.profile`.
    pub fn new(config: &S3Config) -> Result<Self> {
        let credentials = AwsCredentials::load(config.profile.as_deref())?;
        Self::with_credentials(config, &credentials)
    }

    pub fn with_credentials(config: &S3Config, credentials: &AwsCredentials) -> Result<Self> {
        let region = config.region();
        let (endpoint, url_style) = match &config.endpoint {
            Some(endpoint) => (endpoint.clone(), UrlStyle::Path),
            None => (
                format!("https://s3.{region}.amazonaws.com"),
                UrlStyle::VirtualHost,
            ),
        };
        let base_url = endpoint
            .parse::<url::Url>()
            .with_context(|| format!("invalid S3 endpoint url '{endpoint}'"))?;
        let bucket = Bucket::new(base_url, url_style, config.bucket.clone(), region.to_string())
            .map_err(|e| anyhow!("invalid bucket '{}': {e}", config.bucket))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("slackback/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build http client")?;
        debug!(bucket = %config.bucket, %endpoint, region, "s3 store");
        Ok(Self {
            bucket,
            credentials: credentials.to_rusty(),
            client,
        })
    }
}

impl ObjectStore for S3Store {
    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let body = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let url = self
            .bucket
            .put_object(Some(&self.credentials), key)
            .sign(PRESIGN_DURATION);
        let response = self
            .client
            .put(url.as_str())
            .body(body)
            .send()
            .await
            .with_context(|| format!("S3 PUT {key}"))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            bail!("S3 PUT {key}: http {status}: {message}");
        }
        Ok(())
    }
}
