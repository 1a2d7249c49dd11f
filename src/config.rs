//! Configuration types for photos-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Library API endpoint and paging behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the library API (default: "https://photoslibrary.googleapis.com/")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Albums requested per page (default: 50, the API maximum)
    #[serde(default = "default_albums_page_size")]
    pub albums_page_size: u32,

    /// Media items requested per page (default: 100, the API maximum)
    #[serde(default = "default_media_page_size")]
    pub media_page_size: u32,

    /// Pause between consecutive page requests (default: 500ms)
    #[serde(default = "default_page_delay", with = "duration_ms_serde")]
    pub page_delay: Duration,

    /// Timeout for a single API request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            albums_page_size: default_albums_page_size(),
            media_page_size: default_media_page_size(),
            page_delay: default_page_delay(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// What to do when an album's archive already exists on disk
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingArchive {
    /// Leave the existing archive alone and skip the album (default)
    #[default]
    Skip,
    /// Replace the existing archive
    Overwrite,
    /// Write to "Title (1).zip", "Title (2).zip", ...
    Rename,
}

/// Download and archive behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory receiving one archive per album (default: "./google_photos_downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Timeout for one media byte fetch, body included (default: 60 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// Pause between consecutive media items (default: 100ms)
    #[serde(default = "default_item_delay", with = "duration_ms_serde")]
    pub item_delay: Duration,

    /// Existing archive handling
    #[serde(default)]
    pub existing_archive: ExistingArchive,

    /// Keep archives that ended up with no entries (default: false)
    #[serde(default)]
    pub keep_empty_archives: bool,

    /// Where fetched payloads are spooled before entering the archive (system temp if None)
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            fetch_timeout: default_fetch_timeout(),
            item_delay: default_item_delay(),
            existing_archive: ExistingArchive::default(),
            keep_empty_archives: false,
            spool_dir: None,
        }
    }
}

/// Retry behavior for media byte fetches
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per item, the first included (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Upper bound for any computed delay (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Where credentials come from
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Authorized-user token file with a refresh token (default: "token.json")
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,

    /// Fixed bearer token; takes precedence over the token file
    #[serde(default)]
    pub access_token: Option<String>,

    /// OAuth token endpoint used for refreshes
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_file: default_token_file(),
            access_token: None,
            token_uri: default_token_uri(),
        }
    }
}

/// Main configuration
///
/// Every field has a default, so an empty JSON object is a valid config file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Library API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Download and archive settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Media fetch retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Credential settings
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration from a JSON file and validate it
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("cannot parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(invalid("api.base_url", "not a valid URL"));
        }
        if self.api.albums_page_size == 0 {
            return Err(invalid("api.albums_page_size", "must be at least 1"));
        }
        if self.api.media_page_size == 0 {
            return Err(invalid("api.media_page_size", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.initial_delay > self.retry.max_delay {
            return Err(invalid(
                "retry.initial_delay",
                "must not exceed retry.max_delay",
            ));
        }
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&self.retry.backoff_multiplier) {
            return Err(invalid(
                "retry.backoff_multiplier",
                "must be between 1.0 and 100.0",
            ));
        }
        Ok(())
    }
}

/// Largest accepted backoff multiplier; NaN and infinity fail the range check too
const MAX_BACKOFF_MULTIPLIER: f64 = 100.0;

fn invalid(key: &str, message: &str) -> Error {
    Error::Config {
        message: format!("{key} {message}"),
        key: Some(key.to_string()),
    }
}

fn default_base_url() -> String {
    "https://photoslibrary.googleapis.com/".to_string()
}

fn default_albums_page_size() -> u32 {
    50
}

fn default_media_page_size() -> u32 {
    100
}

fn default_page_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("google_photos_downloads")
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_item_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_token_file() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds, for sub-second delays)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
