//! Album download orchestration, split into focused submodules.
//!
//! The `AlbumDownloader` struct and its methods are organized by concern:
//! - [`executor`] - Fetching one media item with retry and URL re-resolution
//! - [`album`] - The per-album state machine (listing, downloading, finalizing)

mod album;
pub mod executor;


pub use executor::DownloadExecutor;

use crate::auth::{CredentialProvider, provider_from_config};
use crate::catalog::{AlbumCatalog, MediaCatalog};
use crate::client::LibraryClient;
use crate::config::Config;
use crate::error::{CatalogError, Error, Result};
use crate::types::{Album, AlbumReport, Event, RunSummary};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Downloads albums into zip archives (cloneable, all state is shared)
#[derive(Clone)]
pub struct AlbumDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Album listing and lookup
    pub(crate) albums: AlbumCatalog,
    /// Media listing and URL re-resolution
    pub(crate) media: MediaCatalog,
    /// Per-item fetcher
    pub(crate) executor: DownloadExecutor,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Stop signal, checked between items and between albums
    pub(crate) cancel: CancellationToken,
}

impl AlbumDownloader {
    /// Create a downloader using the credentials named in `config.auth`
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or no credentials are available
    pub fn new(config: Config) -> Result<Self> {
        let credentials = provider_from_config(&config.auth)?;
        Self::with_credentials(config, credentials)
    }

    /// Create a downloader with an explicit credential provider
    pub fn with_credentials(
        config: Config,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        config.validate()?;
        tracing::debug!(provider = credentials.name(), "using credential provider");

        let client = LibraryClient::new(&config.api, &config.download, credentials)?;
        let albums = AlbumCatalog::new(client.clone(), &config.api);
        let media = MediaCatalog::new(client.clone(), &config.api);
        let executor = DownloadExecutor::new(
            client,
            media.clone(),
            config.retry.clone(),
            &config.download,
        );

        // Buffer of 1000 events lets slow subscribers lag without blocking downloads
        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            config: Arc::new(config),
            albums,
            media,
            executor,
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops the run once cancelled
    ///
    /// In-flight fetches run to completion; no new item or album is started.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Emit an event, ignoring the case where nobody is listening
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// List every album in the library
    ///
    /// Performs no media requests.
    ///
    /// # Errors
    /// Returns [`Error::Catalog`] if the listing fails part way
    pub async fn list_albums(&self) -> Result<Vec<Album>> {
        let (albums, err) = self.scan_albums().await;
        match err {
            Some(e) => Err(Error::Catalog(e)),
            None => Ok(albums),
        }
    }

    /// List albums, keeping those found before a failed page
    ///
    /// The error, if any, comes back next to the partial listing.
    pub async fn scan_albums(&self) -> (Vec<Album>, Option<CatalogError>) {
        self.albums.collect().await
    }

    /// Download one album, looked up by ID
    ///
    /// # Errors
    /// [`Error::NotFound`] when the ID does not resolve, plus everything
    /// [`AlbumDownloader::download_album`] can return
    pub async fn download_album_by_id(&self, album_id: &str) -> Result<AlbumReport> {
        let album = self.albums.get_album_by_id(album_id).await?;
        self.download_album(&album).await
    }

    /// Download every album, one after another
    ///
    /// Album-level failures are collected in the summary and the run goes on.
    /// A listing that fails part way still processes the albums listed before
    /// the failure.
    ///
    /// # Errors
    /// Only run-fatal errors (rejected or unrefreshable credentials) are returned
    pub async fn download_all(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        let (albums, listing_err) = self.scan_albums().await;
        if let Some(e) = listing_err {
            if e.source.is_fatal() {
                return Err(Error::Catalog(e));
            }
            tracing::warn!(
                error = %e,
                listed = albums.len(),
                "album listing stopped early, continuing with the albums listed so far"
            );
            summary.listing_error = Some(e.to_string());
        }

        tracing::info!(albums = albums.len(), "downloading all albums");
        for album in albums {
            if self.cancel.is_cancelled() {
                tracing::info!("stop requested, not starting further albums");
                break;
            }

            match self.download_album(&album).await {
                Ok(report) => summary.reports.push(report),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(
                        album_id = %album.id,
                        error = %e,
                        "album failed"
                    );
                    summary.errors.push((album, e.to_string()));
                }
            }
        }

        Ok(summary)
    }
}
