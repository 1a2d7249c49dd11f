//! Album listing and lookup

use super::paginate;
use crate::client::{AlbumResource, LibraryClient};
use crate::config::ApiConfig;
use crate::error::{CatalogError, Error, Result};
use crate::types::Album;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use std::time::Duration;

/// The set of albums in the library
#[derive(Clone)]
pub struct AlbumCatalog {
    client: LibraryClient,
    page_size: u32,
    page_delay: Duration,
}

impl AlbumCatalog {
    /// Create a catalog over `client` with page settings from `config`
    pub fn new(client: LibraryClient, config: &ApiConfig) -> Self {
        Self {
            client,
            page_size: config.albums_page_size,
            page_delay: config.page_delay,
        }
    }

    /// Lazily enumerate every album
    ///
    /// Entries without a usable ID are logged and skipped; they do not end
    /// the listing.
    pub fn list_albums(&self) -> BoxStream<'static, std::result::Result<Album, CatalogError>> {
        let client = self.client.clone();
        let page_size = self.page_size;

        paginate(self.page_delay, move |cursor| {
            let client = client.clone();
            async move { client.albums_page(page_size, cursor.as_deref()).await }
        })
        .try_filter_map(|resource: AlbumResource| async move {
            let title = resource.title.clone();
            match resource.into_album() {
                Some(album) => Ok(Some(album)),
                None => {
                    tracing::warn!(title = ?title, "skipping album without an ID");
                    Ok(None)
                }
            }
        })
        .boxed()
    }

    /// Collect the whole listing
    ///
    /// Returns the albums enumerated so far together with the error that
    /// stopped the listing, if any.
    pub async fn collect(&self) -> (Vec<Album>, Option<CatalogError>) {
        let mut albums = Vec::new();
        let mut stream = self.list_albums();
        while let Some(next) = stream.next().await {
            match next {
                Ok(album) => albums.push(album),
                Err(e) => return (albums, Some(e)),
            }
        }
        (albums, None)
    }

    /// Look up one album by ID
    ///
    /// # Errors
    /// [`Error::NotFound`] when the ID does not resolve, [`Error::Auth`] when
    /// credentials are rejected.
    pub async fn get_album_by_id(&self, album_id: &str) -> Result<Album> {
        let resource = self.client.get_album(album_id).await?;
        resource
            .into_album()
            .ok_or_else(|| Error::NotFound(format!("album {}", album_id)))
    }
}
