//! Mock photo library served by wiremock

use photos_dl::config::RetryConfig;
use photos_dl::{AlbumDownloader, Config, StaticToken};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Per-fetch timeout used by fixtures; slow responses beyond it count as network failures
pub const FETCH_TIMEOUT: Duration = Duration::from_millis(300);

/// A mock library API plus a scratch output directory
pub struct Library {
    /// The mock server standing in for the API and the media host
    pub server: MockServer,
    /// Where archives are written
    pub out: TempDir,
}

impl Library {
    /// Start an empty library
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            out: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    /// Configuration pointing at the mock server, with no pacing and fast retries
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.api.base_url = self.server.uri();
        config.api.page_delay = Duration::ZERO;
        config.download.output_dir = self.out.path().to_path_buf();
        config.download.item_delay = Duration::ZERO;
        config.download.fetch_timeout = FETCH_TIMEOUT;
        config.retry = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: true,
        };
        config
    }

    /// Downloader with a static bearer token
    pub fn downloader(&self) -> AlbumDownloader {
        AlbumDownloader::with_credentials(self.config(), Arc::new(StaticToken::new("test-token")))
            .expect("failed to build downloader")
    }

    /// Serve a single-page album listing of `(id, title, item count)`
    ///
    /// Each album can also be fetched on its own by ID.
    pub async fn albums(&self, albums: &[(&str, &str, u64)]) {
        let albums: Vec<_> = albums
            .iter()
            .map(|(id, title, count)| {
                serde_json::json!({
                    "id": id,
                    "title": title,
                    "mediaItemsCount": count.to_string()
                })
            })
            .collect();
        for album in &albums {
            let id = album["id"].as_str().unwrap_or_default();
            Mock::given(method("GET"))
                .and(path(format!("/v1/albums/{}", id)))
                .respond_with(ResponseTemplate::new(200).set_body_json(album))
                .mount(&self.server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/v1/albums"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "albums": albums })),
            )
            .mount(&self.server)
            .await;
    }

    /// Serve a single-page media listing of `(id, filename)` photos for one album
    ///
    /// Returns the mock so callers can attach call-count expectations.
    pub fn album_media(&self, album_id: &str, items: &[(&str, &str)]) -> Mock {
        self.media_page(album_id, None, items, None)
    }

    /// Serve one page of an album's media listing
    ///
    /// `token` is the page token the request must carry; `None` matches any
    /// request for the album, so mount later pages first.
    pub fn media_page(
        &self,
        album_id: &str,
        token: Option<&str>,
        items: &[(&str, &str)],
        next: Option<&str>,
    ) -> Mock {
        let items: Vec<_> = items
            .iter()
            .map(|(id, filename)| {
                serde_json::json!({
                    "id": id,
                    "filename": filename,
                    "baseUrl": format!("{}/media/{}", self.server.uri(), id),
                    "mimeType": "image/jpeg"
                })
            })
            .collect();
        let mut body = serde_json::json!({ "mediaItems": items });
        if let Some(next) = next {
            body["nextPageToken"] = serde_json::json!(next);
        }
        let mut request = serde_json::json!({ "albumId": album_id });
        if let Some(token) = token {
            request["pageToken"] = serde_json::json!(token);
        }
        Mock::given(method("POST"))
            .and(path("/v1/mediaItems:search"))
            .and(body_partial_json(request))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
    }

    /// Matcher for the byte fetch of one item
    pub fn bytes_of(&self, item_id: &str) -> wiremock::MockBuilder {
        Mock::given(method("GET")).and(path(format!("/media/{}=d", item_id)))
    }

    /// Serve `body` for an item's bytes
    pub async fn serve(&self, item_id: &str, body: &[u8]) {
        self.bytes_of(item_id)
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&self.server)
            .await;
    }

    /// Make every byte fetch of an item time out
    pub fn stall(&self, item_id: &str) -> Mock {
        self.bytes_of(item_id).respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"never arrives".to_vec())
                .set_delay(FETCH_TIMEOUT * 5),
        )
    }
}
