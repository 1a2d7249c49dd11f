//! HTTP client for the photo library API
//!
//! Wraps two `reqwest` clients: one for JSON API calls (short timeout) and
//! one for media byte fetches (longer timeout, streamed). Every API call asks
//! the [`CredentialProvider`] for a bearer token first.

use crate::auth::CredentialProvider;
use crate::config::{ApiConfig, DownloadConfig};
use crate::error::{AuthError, DownloadError, Error, Result};
use crate::types::{Album, MediaItem, MediaKind, Page};
use crate::utils::parse_retry_after;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Album entry as returned by `GET v1/albums`
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumResource {
    /// Album ID; entries without one cannot be addressed and are skipped
    #[serde(default)]
    pub id: Option<String>,
    /// Album title
    #[serde(default)]
    pub title: Option<String>,
    /// Item count, sent by the API as a decimal string
    #[serde(default)]
    pub media_items_count: Option<CountValue>,
}

/// A count that may arrive as a JSON string or number
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum CountValue {
    /// `"42"`
    Text(String),
    /// `42`
    Number(u64),
}

impl CountValue {
    fn value(&self) -> u64 {
        match self {
            CountValue::Text(s) => s.trim().parse().unwrap_or(0),
            CountValue::Number(n) => *n,
        }
    }
}

impl AlbumResource {
    /// Convert to the domain type, `None` when the entry has no ID
    pub fn into_album(self) -> Option<Album> {
        let id = self.id.filter(|id| !id.is_empty())?;
        Some(Album {
            id,
            title: self.title.unwrap_or_default(),
            media_count: self.media_items_count.map(|c| c.value()).unwrap_or(0),
        })
    }
}

/// Media item as returned by `POST v1/mediaItems:search` and `GET v1/mediaItems/{id}`
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItemResource {
    /// Item ID
    #[serde(default)]
    pub id: Option<String>,
    /// Original file name
    #[serde(default)]
    pub filename: Option<String>,
    /// Signed base URL, valid for about an hour
    #[serde(default)]
    pub base_url: Option<String>,
    /// MIME type such as `image/jpeg`
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Metadata block, used to tell photos from videos
    #[serde(default)]
    pub media_metadata: Option<MediaMetadata>,
}

/// Subset of `mediaMetadata` the downloader reads
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MediaMetadata {
    /// Present for videos
    #[serde(default)]
    pub video: Option<serde_json::Value>,
    /// Present for photos
    #[serde(default)]
    pub photo: Option<serde_json::Value>,
}

impl MediaItemResource {
    /// Convert to the domain type, `None` when the entry has no ID
    pub fn into_media_item(self) -> Option<MediaItem> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let metadata = self.media_metadata.unwrap_or_default();
        let kind = if metadata.video.is_some() {
            MediaKind::Video
        } else if metadata.photo.is_some() {
            MediaKind::Photo
        } else {
            self.mime_type
                .as_deref()
                .map(MediaKind::from_mime)
                .unwrap_or_default()
        };
        Some(MediaItem {
            id,
            filename: self.filename.unwrap_or_default(),
            source_url: self.base_url.unwrap_or_default(),
            kind,
            approx_size_bytes: None,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumsResponse {
    #[serde(default)]
    albums: Vec<AlbumResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    media_items: Vec<MediaItemResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    album_id: &'a str,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

/// Client for the library API and media byte URLs
#[derive(Clone)]
pub struct LibraryClient {
    api: reqwest::Client,
    media: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl LibraryClient {
    /// Build the HTTP clients
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the base URL is invalid or a client cannot be built
    pub fn new(
        api_config: &ApiConfig,
        download_config: &DownloadConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        let mut base = api_config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| Error::Config {
            message: format!("invalid base URL '{}': {}", api_config.base_url, e),
            key: Some("api.base_url".to_string()),
        })?;

        let api = reqwest::Client::builder()
            .timeout(api_config.request_timeout)
            .user_agent(concat!("photos-dl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to create HTTP client: {}", e),
                key: None,
            })?;
        let media = reqwest::Client::builder()
            .timeout(download_config.fetch_timeout)
            .user_agent(concat!("photos-dl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to create HTTP client: {}", e),
                key: None,
            })?;

        Ok(Self {
            api,
            media,
            base_url,
            credentials,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::InvalidResponse(format!("cannot build URL for {}: {}", path, e)))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T> {
        let credential = self.credentials.credential().await?;
        let response = request
            .header(reqwest::header::AUTHORIZATION, credential.bearer())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(match code {
                401 | 403 => Error::Auth(AuthError::Rejected { status: code }),
                404 => Error::NotFound(what.to_string()),
                _ => Error::Api {
                    status: code,
                    message: body,
                },
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Fetch one page of the album listing
    pub async fn albums_page(
        &self,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<Page<AlbumResource>> {
        let mut url = self.endpoint("v1/albums")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pageSize", &page_size.to_string());
            if let Some(token) = cursor {
                query.append_pair("pageToken", token);
            }
        }

        let response: AlbumsResponse = self.send_json(self.api.get(url), "album listing").await?;
        Ok(Page {
            items: response.albums,
            next_cursor: response.next_page_token,
        })
    }

    /// Fetch one album by ID
    pub async fn get_album(&self, album_id: &str) -> Result<AlbumResource> {
        let url = self.endpoint(&format!("v1/albums/{}", urlencoding::encode(album_id)))?;
        self.send_json(self.api.get(url), &format!("album {}", album_id))
            .await
    }

    /// Fetch one page of an album's media items
    pub async fn media_page(
        &self,
        album_id: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<Page<MediaItemResource>> {
        let url = self.endpoint("v1/mediaItems:search")?;
        let body = SearchRequest {
            album_id,
            page_size,
            page_token: cursor,
        };

        let response: SearchResponse = self
            .send_json(self.api.post(url).json(&body), &format!("album {}", album_id))
            .await?;
        Ok(Page {
            items: response.media_items,
            next_cursor: response.next_page_token,
        })
    }

    /// Fetch one media item by ID, with a freshly signed base URL
    pub async fn get_media_item(&self, item_id: &str) -> Result<MediaItemResource> {
        let url = self.endpoint(&format!("v1/mediaItems/{}", urlencoding::encode(item_id)))?;
        self.send_json(self.api.get(url), &format!("media item {}", item_id))
            .await
    }

    /// Start fetching media bytes
    ///
    /// The base URL is pre-signed, so no authorization header is sent.
    /// Non-success statuses are mapped to a [`DownloadError`]; the caller
    /// streams the body of a successful response.
    pub async fn open_media(
        &self,
        url: &str,
    ) -> std::result::Result<reqwest::Response, DownloadError> {
        let response = self.media.get(url).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, chrono::Utc::now()));
        Err(DownloadError::from_status(status.as_u16(), retry_after))
    }
}
