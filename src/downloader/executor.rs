//! Fetching one media item's bytes with bounded retry.
//!
//! The executor never touches the archive. It returns a [`DownloadOutcome`]
//! whose payload sits in an anonymous spool file, so a failed transfer leaves
//! nothing behind and the album loop stays a plain sequential loop.

use crate::catalog::MediaCatalog;
use crate::client::LibraryClient;
use crate::config::{DownloadConfig, RetryConfig};
use crate::error::{DownloadError, Error};
use crate::retry::{Attempted, download_with_retry};
use crate::types::{DownloadOutcome, DownloadStatus, MediaItem, Payload};
use std::io::{Seek, SeekFrom};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Item state shared by the attempts of one fetch
struct AttemptState {
    item: MediaItem,
    /// Set once the item's source URL has been re-resolved
    re_resolved: bool,
}

/// Fetches media bytes with retry, backoff and one URL re-resolution
#[derive(Clone)]
pub struct DownloadExecutor {
    client: LibraryClient,
    media: MediaCatalog,
    retry: RetryConfig,
    spool_dir: Option<PathBuf>,
}

impl DownloadExecutor {
    /// Create an executor
    pub fn new(
        client: LibraryClient,
        media: MediaCatalog,
        retry: RetryConfig,
        download: &DownloadConfig,
    ) -> Self {
        Self {
            client,
            media,
            retry,
            spool_dir: download.spool_dir.clone(),
        }
    }

    /// Fetch one item
    ///
    /// Network failures, 5xx responses and rate limiting are retried up to
    /// `max_attempts` in total; anything else fails after one attempt. An
    /// expired or missing source URL is re-resolved once through the media
    /// catalog without using up an attempt.
    ///
    /// Failure is returned as data in the outcome, never as an error.
    pub async fn fetch(&self, item: MediaItem) -> DownloadOutcome {
        let state = Mutex::new(AttemptState {
            item,
            re_resolved: false,
        });

        let Attempted { result, attempts } =
            download_with_retry(&self.retry, || self.attempt(&state)).await;

        let item = state.into_inner().item;
        let status = match result {
            Ok(payload) => DownloadStatus::Success(payload),
            Err(e) => {
                tracing::warn!(
                    item_id = %item.id,
                    filename = %item.filename,
                    attempts,
                    kind = %e.kind(),
                    error = %e,
                    "media item failed"
                );
                DownloadStatus::Failed(e)
            }
        };

        DownloadOutcome {
            item,
            attempts,
            status,
        }
    }

    async fn attempt(&self, state: &Mutex<AttemptState>) -> Result<Payload, DownloadError> {
        let mut state = state.lock().await;

        loop {
            let Some(url) = state.item.download_url() else {
                if state.re_resolved {
                    return Err(DownloadError::MalformedResponse(format!(
                        "media item {} has no source URL",
                        state.item.id
                    )));
                }
                self.re_resolve(&mut state).await?;
                continue;
            };

            match self.transfer(&url).await {
                Err(DownloadError::UrlExpired { status }) if !state.re_resolved => {
                    tracing::debug!(item_id = %state.item.id, status, "source URL rejected");
                    self.re_resolve(&mut state).await?;
                }
                other => return other,
            }
        }
    }

    async fn re_resolve(&self, state: &mut AttemptState) -> Result<(), DownloadError> {
        state.re_resolved = true;
        let fresh = self
            .media
            .resolve(&state.item.id)
            .await
            .map_err(|e| match e {
                Error::Auth(auth) => DownloadError::Unauthorized(auth),
                Error::NotFound(_) => DownloadError::ClientRejected { status: 404 },
                Error::Network(e) => DownloadError::Network(e.to_string()),
                Error::Api { status, .. } if status >= 500 => DownloadError::ServerError { status },
                other => DownloadError::MalformedResponse(other.to_string()),
            })?;

        // The listing's filename wins; the lookup only refreshes the URL
        state.item.source_url = fresh.source_url;
        if state.item.filename.is_empty() {
            state.item.filename = fresh.filename;
        }
        Ok(())
    }

    /// Stream one response body into a spool file
    async fn transfer(&self, url: &str) -> Result<Payload, DownloadError> {
        let mut response = self.client.open_media(url).await?;
        let expected = response.content_length();

        let spool = match &self.spool_dir {
            Some(dir) => tempfile::tempfile_in(dir),
            None => tempfile::tempfile(),
        }
        .map_err(DownloadError::Storage)?;
        let mut file = tokio::fs::File::from_std(spool);

        let mut len: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(DownloadError::Storage)?;
            len += chunk.len() as u64;
        }
        file.flush().await.map_err(DownloadError::Storage)?;

        if let Some(expected) = expected {
            if expected != len {
                return Err(DownloadError::Network(format!(
                    "body ended after {} of {} bytes",
                    len, expected
                )));
            }
        }
        if len == 0 {
            return Err(DownloadError::MalformedResponse("empty body".to_string()));
        }

        let mut file = file.into_std().await;
        file.seek(SeekFrom::Start(0))
            .map_err(DownloadError::Storage)?;

        tracing::debug!(bytes = len, "media transfer complete");
        Ok(Payload { file, len })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::config::ApiConfig;
    use crate::error::ErrorKind;
    use crate::types::MediaKind;
    use std::io::Read;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor(server: &MockServer, retry: RetryConfig) -> DownloadExecutor {
        let api = ApiConfig {
            base_url: server.uri(),
            page_delay: Duration::ZERO,
            ..Default::default()
        };
        let download = DownloadConfig::default();
        let client =
            LibraryClient::new(&api, &download, Arc::new(StaticToken::new("tok"))).unwrap();
        let media = MediaCatalog::new(client.clone(), &api);
        DownloadExecutor::new(client, media, retry, &download)
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    fn item(server: &MockServer, name: &str) -> MediaItem {
        MediaItem {
            id: "m1".into(),
            filename: "IMG_0001.jpg".into(),
            source_url: format!("{}/{}", server.uri(), name),
            kind: MediaKind::Photo,
            approx_size_bytes: None,
        }
    }

    fn payload_bytes(outcome: DownloadOutcome) -> Vec<u8> {
        match outcome.status {
            DownloadStatus::Success(mut payload) => {
                let mut buf = Vec::new();
                payload.file.read_to_end(&mut buf).unwrap();
                assert_eq!(buf.len() as u64, payload.len);
                buf
            }
            DownloadStatus::Failed(e) => panic!("expected success, got {}", e),
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok=d"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg-bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = executor(&server, fast_retry()).fetch(item(&server, "ok")).await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(payload_bytes(outcome), b"jpeg-bytes");
    }

    #[tokio::test]
    async fn non_retryable_status_is_one_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone=d"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = executor(&server, fast_retry()).fetch(item(&server, "gone")).await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ClientRejected));
    }

    #[tokio::test]
    async fn fails_twice_then_succeeds_in_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky=d"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky=d"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"third time".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = executor(&server, fast_retry()).fetch(item(&server, "flaky")).await;
        assert_eq!(outcome.attempts, 3);
        assert_eq!(payload_bytes(outcome), b"third time");
    }

    #[tokio::test]
    async fn exhausted_server_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down=d"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let outcome = executor(&server, fast_retry()).fetch(item(&server, "down")).await;
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ServerError));
    }

    #[tokio::test]
    async fn retry_after_overrides_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy=d"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy=d"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        // Computed backoff would be 30s; the hint of 0s must win
        let retry = RetryConfig {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
            ..fast_retry()
        };
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            executor(&server, retry).fetch(item(&server, "busy")),
        )
        .await
        .expect("Retry-After hint was not honored");
        assert_eq!(outcome.attempts, 2);
        assert_eq!(payload_bytes(outcome), b"ok");
    }

    #[tokio::test]
    async fn expired_url_is_re_resolved_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stale=d"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/mediaItems/m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "m1",
                "filename": "IMG_0001.jpg",
                "baseUrl": format!("{}/fresh", server.uri()),
                "mimeType": "image/jpeg"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fresh=d"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
            .mount(&server)
            .await;

        let outcome = executor(&server, fast_retry()).fetch(item(&server, "stale")).await;
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.item.source_url.ends_with("/fresh"));
        assert_eq!(payload_bytes(outcome), b"fresh");
    }

    #[tokio::test]
    async fn still_expired_after_re_resolve_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stale=d"))
            .respond_with(ResponseTemplate::new(403))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/mediaItems/m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "m1",
                "baseUrl": format!("{}/stale", server.uri()),
                "mimeType": "image/jpeg"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = executor(&server, fast_retry()).fetch(item(&server, "stale")).await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ClientRejected));
    }

    #[tokio::test]
    async fn missing_url_without_replacement_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/mediaItems/m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "m1",
                "filename": "IMG_0001.jpg"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut no_url = item(&server, "unused");
        no_url.source_url.clear();
        let outcome = executor(&server, fast_retry()).fetch(no_url).await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::MalformedResponse));
    }

    #[tokio::test]
    async fn rejected_credentials_during_re_resolve_are_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/mediaItems/m1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut no_url = item(&server, "unused");
        no_url.source_url.clear();
        let outcome = executor(&server, fast_retry()).fetch(no_url).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Unauthorized));
    }

    #[tokio::test]
    async fn empty_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty=d"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = executor(&server, fast_retry()).fetch(item(&server, "empty")).await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::MalformedResponse));
    }
}
