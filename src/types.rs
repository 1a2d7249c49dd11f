//! Core types for photos-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{DownloadError, ErrorKind};

/// A named collection of media items, as listed by the library API
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    /// Stable API-assigned identifier
    pub id: String,
    /// Display title; may be empty and is not unique
    pub title: String,
    /// Number of media items the API reports for the album
    pub media_count: u64,
}

impl Album {
    /// Title for display, "Untitled" when empty
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "Untitled"
        } else {
            &self.title
        }
    }
}

/// Broad media category, decides the download URL suffix and compression
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image
    Photo,
    /// Video clip
    Video,
    /// Anything else
    #[default]
    Other,
}

impl MediaKind {
    /// Guess the kind from a MIME type such as "image/jpeg"
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            MediaKind::Photo
        } else if mime.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Other
        }
    }
}

/// One photo or video belonging to an album
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Identifier, unique within the library
    pub id: String,
    /// Original file name; may collide with other items in the same album
    pub filename: String,
    /// Short-lived signed base URL for the bytes; empty when the API omitted it
    pub source_url: String,
    /// Photo, video, or other
    pub kind: MediaKind,
    /// Size hint when the API provides one
    pub approx_size_bytes: Option<u64>,
}

impl MediaItem {
    /// URL that returns the item's bytes
    ///
    /// Photos download with `=d`, videos with `=dv`.
    pub fn download_url(&self) -> Option<String> {
        if self.source_url.is_empty() {
            return None;
        }
        let suffix = match self.kind {
            MediaKind::Video => "=dv",
            MediaKind::Photo | MediaKind::Other => "=d",
        };
        Some(format!("{}{}", self.source_url, suffix))
    }
}

/// One page of a cursor-paginated listing
#[derive(Clone, Debug)]
pub struct Page<T> {
    /// Items in server order
    pub items: Vec<T>,
    /// Cursor for the following page; `None` on the last page
    pub next_cursor: Option<String>,
}

/// Fetched media bytes, spooled to an anonymous temporary file
///
/// The file is deleted by the OS when the payload is dropped.
#[derive(Debug)]
pub struct Payload {
    /// Spool file positioned at the start of the data
    pub file: std::fs::File,
    /// Number of bytes written to the spool
    pub len: u64,
}

/// Terminal result of one item's download attempts
#[derive(Debug)]
pub enum DownloadStatus {
    /// Bytes are ready to be written to the archive
    Success(Payload),
    /// The last attempt failed and no further attempt is allowed
    Failed(DownloadError),
}

/// Download result for one media item
#[derive(Debug)]
pub struct DownloadOutcome {
    /// The item, with its source URL as last resolved
    pub item: MediaItem,
    /// Attempts made, the first included (1 for non-retryable failures)
    pub attempts: u32,
    /// Success or failure
    pub status: DownloadStatus,
}

impl DownloadOutcome {
    /// Failure classification, `None` on success
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.status {
            DownloadStatus::Success(_) => None,
            DownloadStatus::Failed(e) => Some(e.kind()),
        }
    }
}

/// A failure recorded in an album report
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureRecord {
    /// An enumerated media item did not make it into the archive
    Item {
        /// The item that failed
        item: MediaItem,
        /// Failure classification
        kind: ErrorKind,
        /// Attempts made
        attempts: u32,
        /// Human-readable reason
        message: String,
    },
    /// Listing the album's media failed part way
    CatalogFailed {
        /// Cursor reached before the failure
        last_cursor: Option<String>,
        /// Human-readable reason
        message: String,
    },
}

/// How an album run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumStatus {
    /// Every enumerated item was processed
    Complete,
    /// Media listing failed; items enumerated before the failure were processed
    CatalogFailed,
    /// Repeated storage failures stopped the album
    Aborted,
    /// A stop signal arrived between items
    Cancelled,
    /// An archive already existed and the policy is to skip
    SkippedExisting,
}

/// Orchestrator phase for one album
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumPhase {
    /// Enumerating media items
    Listing,
    /// Fetching items and writing entries
    Downloading,
    /// Writing the archive's central directory
    Finalizing,
    /// Report is ready
    Done,
}

/// Per-album result returned to the presentation layer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlbumReport {
    /// The album that was processed
    pub album: Album,
    /// Archive path; `None` when nothing was kept on disk
    pub archive: Option<PathBuf>,
    /// How the run ended
    pub status: AlbumStatus,
    /// Number of entries written
    pub succeeded: usize,
    /// Failures in enumeration order
    pub failed: Vec<FailureRecord>,
    /// Archive entry names in write order
    pub entries: Vec<String>,
    /// Reason the album stopped early, if it did
    pub aborted_reason: Option<String>,
    /// When processing started
    pub started_at: DateTime<Utc>,
    /// When the report was produced
    pub finished_at: DateTime<Utc>,
}

impl AlbumReport {
    pub(crate) fn new(album: Album) -> Self {
        let now = Utc::now();
        Self {
            album,
            archive: None,
            status: AlbumStatus::Complete,
            succeeded: 0,
            failed: Vec::new(),
            entries: Vec::new(),
            aborted_reason: None,
            started_at: now,
            finished_at: now,
        }
    }

    /// Items that failed, skipping the synthetic catalog record
    pub fn failed_items(&self) -> impl Iterator<Item = (&MediaItem, ErrorKind)> {
        self.failed.iter().filter_map(|f| match f {
            FailureRecord::Item { item, kind, .. } => Some((item, *kind)),
            FailureRecord::CatalogFailed { .. } => None,
        })
    }

    /// Number of media items the album run enumerated
    pub fn enumerated(&self) -> usize {
        self.succeeded + self.failed_items().count()
    }
}

/// Totals across a multi-album run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// One report per album, in listing order
    pub reports: Vec<AlbumReport>,
    /// Albums whose run stopped with an error outside the report (e.g. archive creation)
    pub errors: Vec<(Album, String)>,
    /// Set when listing albums stopped part way; the albums listed before it were still processed
    pub listing_error: Option<String>,
}

impl RunSummary {
    /// Total entries written across albums
    pub fn total_succeeded(&self) -> usize {
        self.reports.iter().map(|r| r.succeeded).sum()
    }

    /// Total failed items across albums
    pub fn total_failed(&self) -> usize {
        self.reports.iter().map(|r| r.failed_items().count()).sum()
    }
}

/// Progress events emitted while albums are processed
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An album entered a new phase
    AlbumPhase {
        /// Album ID
        album_id: String,
        /// Phase entered
        phase: AlbumPhase,
    },

    /// An item was written to the archive
    ItemDownloaded {
        /// Album ID
        album_id: String,
        /// Position in enumeration order (0-based)
        index: usize,
        /// Entry name in the archive
        entry: String,
        /// Bytes written
        bytes: u64,
        /// Attempts taken
        attempts: u32,
    },

    /// An item failed
    ItemFailed {
        /// Album ID
        album_id: String,
        /// Position in enumeration order (0-based)
        index: usize,
        /// Item filename
        filename: String,
        /// Failure classification
        kind: ErrorKind,
    },

    /// An album's report is ready
    AlbumFinished {
        /// Album ID
        album_id: String,
        /// Final status
        status: AlbumStatus,
        /// Entries written
        succeeded: usize,
        /// Items failed
        failed: usize,
    },
}
