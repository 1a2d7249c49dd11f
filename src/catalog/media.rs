//! Media items of one album

use super::paginate;
use crate::client::{LibraryClient, MediaItemResource};
use crate::config::ApiConfig;
use crate::error::{CatalogError, Error, Result};
use crate::types::MediaItem;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use std::time::Duration;

/// Ordered media listing and URL re-resolution
#[derive(Clone)]
pub struct MediaCatalog {
    client: LibraryClient,
    page_size: u32,
    page_delay: Duration,
}

impl MediaCatalog {
    /// Create a catalog over `client` with page settings from `config`
    pub fn new(client: LibraryClient, config: &ApiConfig) -> Self {
        Self {
            client,
            page_size: config.media_page_size,
            page_delay: config.page_delay,
        }
    }

    /// Lazily enumerate an album's media items in server order
    ///
    /// An empty album yields an empty stream. Source URLs expire about an
    /// hour after the page that carried them, so long albums rely on
    /// [`MediaCatalog::resolve`] to refresh stale ones.
    pub fn list_media(
        &self,
        album_id: &str,
    ) -> BoxStream<'static, std::result::Result<MediaItem, CatalogError>> {
        let client = self.client.clone();
        let page_size = self.page_size;
        let album_id = album_id.to_string();

        paginate(self.page_delay, move |cursor| {
            let client = client.clone();
            let album_id = album_id.clone();
            async move {
                client
                    .media_page(&album_id, page_size, cursor.as_deref())
                    .await
            }
        })
        .try_filter_map(|resource: MediaItemResource| async move {
            let filename = resource.filename.clone();
            match resource.into_media_item() {
                Some(item) => Ok(Some(item)),
                None => {
                    tracing::warn!(filename = ?filename, "skipping media item without an ID");
                    Ok(None)
                }
            }
        })
        .boxed()
    }

    /// Fetch a fresh copy of one item, including a newly signed source URL
    pub async fn resolve(&self, item_id: &str) -> Result<MediaItem> {
        tracing::debug!(item_id, "re-resolving media item");
        let resource = self.client.get_media_item(item_id).await?;
        resource.into_media_item().ok_or_else(|| {
            Error::InvalidResponse(format!("media item {} came back without an ID", item_id))
        })
    }
}
