//! # photos-dl
//!
//! Download photo albums from a paginated, rate-limited library API into one
//! zip archive per album.
//!
//! ## Design Philosophy
//!
//! photos-dl is designed to be:
//! - **Failure isolating** - A failed item is recorded in the album report; only
//!   credential failures stop a run
//! - **Bounded in memory** - Payloads are spooled to disk and streamed into the
//!   archive one at a time
//! - **Always consistent** - Archives are finalized on every exit path, so a
//!   partial album is still a valid zip
//! - **Event-driven** - Consumers subscribe to progress events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use photos_dl::{AlbumDownloader, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.auth.access_token = Some("ya29.token".to_string());
//!
//!     let downloader = AlbumDownloader::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = downloader.download_album_by_id("A1").await?;
//!     println!("{} entries, {} failed", report.succeeded, report.failed.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Zip archive writing
pub mod archive;
/// Credential providers
pub mod auth;
/// Paginated album and media listings
pub mod catalog;
/// HTTP client for the library API
pub mod client;
/// Configuration types
pub mod config;
/// Album download orchestration
pub mod downloader;
/// Error types
pub mod error;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use archive::{ArchiveEntry, ArchiveWriter};
pub use auth::{Credential, CredentialProvider, RefreshingToken, StaticToken};
pub use catalog::{AlbumCatalog, MediaCatalog, paginate};
pub use client::LibraryClient;
pub use config::{Config, ExistingArchive};
pub use downloader::{AlbumDownloader, DownloadExecutor};
pub use error::{
    ArchiveError, AuthError, CatalogError, DownloadError, Error, ErrorKind, Result,
};
pub use types::{
    Album, AlbumPhase, AlbumReport, AlbumStatus, DownloadOutcome, DownloadStatus, Event,
    FailureRecord, MediaItem, MediaKind, Page, RunSummary,
};

/// Cancel `token` when a termination signal arrives.
///
/// The downloader checks the token between items and between albums, so an
/// in-flight fetch finishes and its archive is still finalized.
///
/// Unix listens for SIGINT and SIGTERM; other platforms for Ctrl+C.
///
/// # Example
///
/// ```no_run
/// use photos_dl::{AlbumDownloader, Config, cancel_on_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = AlbumDownloader::new(Config::default())?;
///     tokio::spawn(cancel_on_signal(downloader.cancellation_token()));
///
///     let summary = downloader.download_all().await?;
///     println!("{} entries written", summary.total_succeeded());
///     Ok(())
/// }
/// ```
pub async fn cancel_on_signal(token: tokio_util::sync::CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => {
            tracing::info!("stopping after the current item");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

/// Resolves on SIGINT or SIGTERM
///
/// Falls back to `ctrl_c` when handlers cannot be installed (some sandboxes
/// refuse SIGTERM registration).
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let interrupt = signal(SignalKind::interrupt());
    let terminate = signal(SignalKind::terminate());
    match (interrupt, terminate) {
        (Ok(mut interrupt), Ok(mut terminate)) => {
            let name = tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
            };
            tracing::info!(signal = name, "termination signal received");
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "only one termination signal could be registered");
            only.recv().await;
            tracing::info!("termination signal received");
        }
        (Err(e), Err(_)) => {
            tracing::warn!(error = %e, "no signal handlers registered, falling back to ctrl_c");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "ctrl_c listener failed");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "ctrl_c listener failed");
        std::future::pending::<()>().await;
    }
    tracing::info!("ctrl_c received");
}
