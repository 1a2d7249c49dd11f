//! Error types for photos-dl
//!
//! The taxonomy mirrors how far a failure is allowed to travel:
//! - [`AuthError`] is run-fatal
//! - [`CatalogError`] ends the listing of one album (items already yielded stay valid)
//! - [`DownloadError`] is isolated to one media item and recorded as data in the report
//! - [`ArchiveError`] is per-item until storage fails twice in a row, then it aborts the album

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for photos-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for photos-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.base_url")
        key: Option<String>,
    },

    /// Credentials are missing, were rejected, or could not be refreshed
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// A paginated listing failed part way through
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// An explicitly requested resource (album, media item) does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Fetching one media item failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Writing the album archive failed
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Library API answered with an unexpected status
    #[error("API returned {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Library API answered with something the client cannot follow (e.g. a repeated cursor)
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// The run was stopped by a shutdown signal
    #[error("cancelled: stop requested")]
    Cancelled,
}

impl Error {
    /// Whether this error must stop the whole run rather than a single album or item
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Auth(_) => true,
            Error::Catalog(e) => e.source.is_fatal(),
            _ => false,
        }
    }

    /// Machine-readable error code used in summaries
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Auth(_) => "auth_error",
            Error::Catalog(_) => "catalog_error",
            Error::NotFound(_) => "not_found",
            Error::Download(e) => e.kind().as_str(),
            Error::Archive(_) => "archive_error",
            Error::Api { .. } => "api_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::InvalidResponse(_) => "invalid_response",
            Error::Cancelled => "cancelled",
        }
    }
}

/// Credential failures
#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable credential source was configured
    #[error("no credentials available: {0}")]
    Missing(String),

    /// The token file exists but could not be read or parsed
    #[error("invalid token file {path}: {reason}")]
    InvalidTokenFile {
        /// Path of the token file
        path: PathBuf,
        /// Why it could not be used
        reason: String,
    },

    /// Refreshing the access token failed (expired or revoked grant)
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// The library API rejected the credential
    #[error("credential rejected by API (HTTP {status})")]
    Rejected {
        /// HTTP status code (401 or 403)
        status: u16,
    },
}

/// A paginated listing failed after zero or more pages loaded successfully
///
/// Items from pages that loaded before the failure have already been yielded.
#[derive(Debug, Error)]
#[error("listing failed after cursor {}: {source}", .last_cursor.as_deref().unwrap_or("<start>"))]
pub struct CatalogError {
    /// Cursor returned by the last page that loaded; `None` if the first page failed
    pub last_cursor: Option<String>,
    /// Underlying failure
    pub source: Box<Error>,
}

impl CatalogError {
    /// Wrap a page failure with the cursor the listing had reached
    pub fn new(last_cursor: Option<String>, source: Error) -> Self {
        Self {
            last_cursor,
            source: Box::new(source),
        }
    }
}

/// Failure fetching one media item's bytes
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Connection failure, timeout, or body interrupted mid-transfer
    #[error("network failure: {0}")]
    Network(String),

    /// Server asked us to slow down (HTTP 429)
    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited {
        /// Server-provided Retry-After hint
        retry_after: Option<Duration>,
    },

    /// 5xx response
    #[error("server error (HTTP {status})")]
    ServerError {
        /// HTTP status code
        status: u16,
    },

    /// The signed source URL is expired or was never present
    #[error("source URL expired or missing (HTTP {status})")]
    UrlExpired {
        /// HTTP status code (401/403), or 0 when the item carried no URL
        status: u16,
    },

    /// 4xx response other than rate limiting
    #[error("request rejected (HTTP {status})")]
    ClientRejected {
        /// HTTP status code
        status: u16,
    },

    /// Response could not be interpreted (bad length, missing URL after re-resolve)
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Local write of the fetched payload failed
    #[error("storage failure: {0}")]
    Storage(#[source] std::io::Error),

    /// Credentials failed while re-resolving the item
    #[error("unauthorized: {0}")]
    Unauthorized(#[source] AuthError),
}

impl DownloadError {
    /// Classify for the album report
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::Network(_) => ErrorKind::Network,
            DownloadError::RateLimited { .. } => ErrorKind::RateLimited,
            DownloadError::ServerError { .. } => ErrorKind::ServerError,
            DownloadError::UrlExpired { .. } | DownloadError::ClientRejected { .. } => {
                ErrorKind::ClientRejected
            }
            DownloadError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            DownloadError::Storage(_) => ErrorKind::StorageError,
            DownloadError::Unauthorized(_) => ErrorKind::Unauthorized,
        }
    }
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return DownloadError::from_status(status.as_u16(), None);
        }
        DownloadError::Network(e.to_string())
    }
}

impl DownloadError {
    /// Map a non-success byte-fetch status to an error
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            429 => DownloadError::RateLimited { retry_after },
            401 | 403 => DownloadError::UrlExpired { status },
            500..=599 => DownloadError::ServerError { status },
            _ => DownloadError::ClientRejected { status },
        }
    }
}

/// Per-item failure classification recorded in album reports
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeouts, connection failures, interrupted transfers
    Network,
    /// Still rate limited after all attempts
    RateLimited,
    /// Still failing with 5xx after all attempts
    ServerError,
    /// 4xx other than rate limiting
    ClientRejected,
    /// Unusable response or item metadata
    MalformedResponse,
    /// Local spool or archive write failed
    StorageError,
    /// Credentials failed during the item's processing
    Unauthorized,
}

impl ErrorKind {
    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::ClientRejected => "client_rejected",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::StorageError => "storage_error",
            ErrorKind::Unauthorized => "unauthorized",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Archive container failures
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive file could not be created
    #[error("failed to create archive {path}: {source}")]
    Create {
        /// Target archive path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Writing one entry failed; the entry was removed and the archive remains usable
    #[error("failed to write entry {name}: {source}")]
    Entry {
        /// Resolved entry name
        name: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Storage failed on consecutive entries; the album must stop
    #[error("{consecutive} consecutive storage failures, last on entry {name}: {source}")]
    RepeatedStorageFailure {
        /// Number of consecutive failed entries
        consecutive: u32,
        /// Entry that failed last
        name: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Writing the central directory failed
    #[error("failed to finalize archive {path}: {reason}")]
    Finalize {
        /// Archive path
        path: PathBuf,
        /// Why finalization failed
        reason: String,
    },

    /// The archive was already finalized
    #[error("archive {0} is already finalized")]
    Closed(PathBuf),

    /// The blocking task writing the archive panicked or was cancelled
    #[error("archive writer task failed: {0}")]
    WriterTask(String),
}

impl ArchiveError {
    /// Whether the album must stop after this error
    pub fn aborts_album(&self) -> bool {
        !matches!(self, ArchiveError::Entry { .. })
    }
}
