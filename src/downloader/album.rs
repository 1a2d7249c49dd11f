//! One album run: Listing -> Downloading -> Finalizing -> Done.

use super::AlbumDownloader;
use crate::archive::{ArchiveEntry, ArchiveWriter};
use crate::config::ExistingArchive;
use crate::error::{ArchiveError, DownloadError, Error, ErrorKind, Result};
use crate::types::{
    Album, AlbumPhase, AlbumReport, AlbumStatus, DownloadOutcome, DownloadStatus, Event,
    FailureRecord, MediaItem, MediaKind, Payload,
};
use crate::utils::{archive_path_for, sanitize_album_title, sanitize_entry_name};
use chrono::Utc;
use futures::StreamExt;

/// Why the item loop stopped
enum Stop {
    /// The listing ran out
    Exhausted,
    /// The album must end early with this status
    Early(AlbumStatus),
    /// The whole run must stop after the archive is closed
    Fatal(Error),
}

impl AlbumDownloader {
    /// Download one album into `<output_dir>/<title>.zip`
    ///
    /// Items are fetched and written one at a time, in listing order. Item
    /// failures are recorded in the report and never stop the album. A
    /// listing failure ends the album with the items processed so far and a
    /// synthetic catalog record. The archive is finalized on every path.
    ///
    /// # Errors
    /// Returns an error when the archive cannot be created, or when
    /// credentials fail (run-fatal).
    pub async fn download_album(&self, album: &Album) -> Result<AlbumReport> {
        let mut report = AlbumReport::new(album.clone());
        let download = &self.config.download;

        tokio::fs::create_dir_all(&download.output_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "failed to create output directory '{}': {}",
                        download.output_dir.display(),
                        e
                    ),
                ))
            })?;

        let Some(path) = archive_path_for(&download.output_dir, album, download.existing_archive)
        else {
            let existing = download
                .output_dir
                .join(format!("{}.zip", sanitize_album_title(&album.title, &album.id)));
            tracing::info!(
                album_id = %album.id,
                path = %existing.display(),
                "archive already exists, skipping album"
            );
            report.archive = Some(existing);
            report.status = AlbumStatus::SkippedExisting;
            return Ok(self.finish(report));
        };

        let overwrite = download.existing_archive == ExistingArchive::Overwrite;
        let writer = ArchiveWriter::create(&path, overwrite)?;
        report.archive = Some(path.clone());

        tracing::info!(
            album_id = %album.id,
            title = album.display_title(),
            items = album.media_count,
            path = %path.display(),
            "downloading album"
        );

        let mut writer = Some(writer);
        let fatal = match self.run_items(album, &mut writer, &mut report).await {
            Stop::Exhausted => None,
            Stop::Early(status) => {
                report.status = status;
                None
            }
            Stop::Fatal(e) => Some(e),
        };

        self.phase(album, AlbumPhase::Finalizing);
        if let Some(mut writer) = writer {
            if let Err(e) = writer.finalize() {
                tracing::error!(album_id = %album.id, error = %e, "archive finalization failed");
                report.status = AlbumStatus::Aborted;
                report.aborted_reason = Some(e.to_string());
            }
        }

        if report.succeeded == 0 && !download.keep_empty_archives {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "removed empty archive");
                    report.archive = None;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to remove empty archive"
                    )
                }
            }
        }

        if let Some(e) = fatal {
            self.finish(report);
            return Err(e);
        }
        Ok(self.finish(report))
    }

    async fn run_items(
        &self,
        album: &Album,
        writer: &mut Option<ArchiveWriter>,
        report: &mut AlbumReport,
    ) -> Stop {
        self.phase(album, AlbumPhase::Listing);
        let mut items = self.media.list_media(&album.id);
        let item_delay = self.config.download.item_delay;
        let mut index = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(album_id = %album.id, processed = index, "stop requested");
                return Stop::Early(AlbumStatus::Cancelled);
            }

            let item = match items.next().await {
                None => return Stop::Exhausted,
                Some(Ok(item)) => item,
                Some(Err(e)) => {
                    tracing::warn!(album_id = %album.id, error = %e, "media listing failed");
                    report.failed.push(FailureRecord::CatalogFailed {
                        last_cursor: e.last_cursor.clone(),
                        message: e.source.to_string(),
                    });
                    if e.source.is_fatal() {
                        return Stop::Fatal(Error::Catalog(e));
                    }
                    return Stop::Early(AlbumStatus::CatalogFailed);
                }
            };

            if index == 0 {
                self.phase(album, AlbumPhase::Downloading);
            } else if !item_delay.is_zero() {
                tokio::time::sleep(item_delay).await;
            }

            let outcome = self.executor.fetch(item).await;
            if let Some(stop) = self.record(album, index, outcome, writer, report).await {
                return stop;
            }
            index += 1;
        }
    }

    /// Turn one outcome into an archive entry or a failure record
    async fn record(
        &self,
        album: &Album,
        index: usize,
        outcome: DownloadOutcome,
        writer: &mut Option<ArchiveWriter>,
        report: &mut AlbumReport,
    ) -> Option<Stop> {
        let DownloadOutcome {
            item,
            attempts,
            status,
        } = outcome;

        let payload = match status {
            DownloadStatus::Success(payload) => payload,
            DownloadStatus::Failed(e) => {
                let kind = e.kind();
                let reason = e.to_string();
                self.fail_item(album, index, item, kind, attempts, reason.clone(), report);
                if let DownloadError::Unauthorized(auth) = e {
                    return Some(Stop::Fatal(Error::Auth(auth)));
                }
                // A full or missing spool dir is as final as a failing archive disk
                let exhausted = kind == ErrorKind::StorageError
                    && writer.as_mut().is_some_and(|w| w.note_storage_failure());
                if exhausted {
                    tracing::error!(
                        album_id = %album.id,
                        error = %reason,
                        "repeated storage failure"
                    );
                    report.aborted_reason = Some(reason);
                    return Some(Stop::Early(AlbumStatus::Aborted));
                }
                return None;
            }
        };

        let Some(current) = writer.take() else {
            let closed = ArchiveError::Closed(report.archive.clone().unwrap_or_default());
            self.fail_item(
                album,
                index,
                item,
                ErrorKind::StorageError,
                attempts,
                closed.to_string(),
                report,
            );
            return Some(Stop::Early(AlbumStatus::Aborted));
        };

        let name = sanitize_entry_name(&item);
        match write_entry(current, name, item.kind, payload).await {
            Ok((current, Ok(entry))) => {
                *writer = Some(current);
                tracing::info!(
                    album_id = %album.id,
                    entry = %entry.name,
                    bytes = entry.bytes,
                    attempts,
                    "item downloaded"
                );
                self.emit(Event::ItemDownloaded {
                    album_id: album.id.clone(),
                    index,
                    entry: entry.name.clone(),
                    bytes: entry.bytes,
                    attempts,
                });
                report.succeeded += 1;
                report.entries.push(entry.name);
                None
            }
            Ok((current, Err(e))) => {
                *writer = Some(current);
                let aborts = e.aborts_album();
                let reason = e.to_string();
                self.fail_item(
                    album,
                    index,
                    item,
                    ErrorKind::StorageError,
                    attempts,
                    reason.clone(),
                    report,
                );
                if aborts {
                    report.aborted_reason = Some(reason);
                    return Some(Stop::Early(AlbumStatus::Aborted));
                }
                None
            }
            Err(e) => {
                // The writer was dropped (and finalized) inside the failed task
                let reason = e.to_string();
                self.fail_item(
                    album,
                    index,
                    item,
                    ErrorKind::StorageError,
                    attempts,
                    reason.clone(),
                    report,
                );
                report.aborted_reason = Some(reason);
                Some(Stop::Early(AlbumStatus::Aborted))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fail_item(
        &self,
        album: &Album,
        index: usize,
        item: MediaItem,
        kind: ErrorKind,
        attempts: u32,
        message: String,
        report: &mut AlbumReport,
    ) {
        self.emit(Event::ItemFailed {
            album_id: album.id.clone(),
            index,
            filename: item.filename.clone(),
            kind,
        });
        report.failed.push(FailureRecord::Item {
            item,
            kind,
            attempts,
            message,
        });
    }

    fn phase(&self, album: &Album, phase: AlbumPhase) {
        tracing::debug!(album_id = %album.id, ?phase, "album phase");
        self.emit(Event::AlbumPhase {
            album_id: album.id.clone(),
            phase,
        });
    }

    fn finish(&self, mut report: AlbumReport) -> AlbumReport {
        report.finished_at = Utc::now();
        self.phase(&report.album, AlbumPhase::Done);

        let failed = report.failed_items().count();
        tracing::info!(
            album_id = %report.album.id,
            status = ?report.status,
            succeeded = report.succeeded,
            failed,
            "album finished"
        );
        self.emit(Event::AlbumFinished {
            album_id: report.album.id.clone(),
            status: report.status,
            succeeded: report.succeeded,
            failed,
        });
        report
    }
}

/// The writer handed back by [`write_entry`] with the entry's own result
type WrittenEntry = (ArchiveWriter, std::result::Result<ArchiveEntry, ArchiveError>);

/// Copy a spooled payload into the archive on the blocking pool
///
/// The writer moves into the task and comes back with the result; if the task
/// itself fails the writer is gone.
async fn write_entry(
    mut writer: ArchiveWriter,
    name: String,
    kind: MediaKind,
    payload: Payload,
) -> std::result::Result<WrittenEntry, ArchiveError> {
    tokio::task::spawn_blocking(move || {
        let mut file = payload.file;
        let result = writer.add_entry(&name, kind, &mut file);
        (writer, result)
    })
    .await
    .map_err(|e| ArchiveError::WriterTask(e.to_string()))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::config::Config;
    use std::io::{Seek, SeekFrom, Write};
    use std::path::Path;
    use std::sync::Arc;

    fn downloader() -> AlbumDownloader {
        let mut config = Config::default();
        config.api.base_url = "http://127.0.0.1:9".to_string();
        AlbumDownloader::with_credentials(config, Arc::new(StaticToken::new("tok"))).unwrap()
    }

    fn item(id: &str, filename: &str) -> MediaItem {
        MediaItem {
            id: id.into(),
            filename: filename.into(),
            source_url: format!("http://127.0.0.1:9/media/{id}"),
            kind: MediaKind::Photo,
            approx_size_bytes: None,
        }
    }

    fn fetched(item: MediaItem, body: &[u8]) -> DownloadOutcome {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(body).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        DownloadOutcome {
            item,
            attempts: 1,
            status: DownloadStatus::Success(Payload {
                file,
                len: body.len() as u64,
            }),
        }
    }

    /// A payload whose spool handle cannot be read back
    fn unreadable(item: MediaItem, dir: &Path) -> DownloadOutcome {
        let file = std::fs::File::create(dir.join(format!("{}.spool", item.id))).unwrap();
        DownloadOutcome {
            item,
            attempts: 1,
            status: DownloadStatus::Success(Payload { file, len: 4 }),
        }
    }

    fn spool_failure(item: MediaItem) -> DownloadOutcome {
        DownloadOutcome {
            item,
            attempts: 1,
            status: DownloadStatus::Failed(DownloadError::Storage(std::io::Error::other(
                "no space left on device",
            ))),
        }
    }

    fn zip_names(path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn album() -> Album {
        Album {
            id: "A1".into(),
            title: "Trip2024".into(),
            media_count: 3,
        }
    }

    #[tokio::test]
    async fn failed_entry_write_leaves_no_trace_in_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Trip2024.zip");
        let dl = downloader();
        let album = album();
        let mut writer = Some(ArchiveWriter::create(&path, false).unwrap());
        let mut report = AlbumReport::new(album.clone());

        let outcomes = vec![
            fetched(item("m1", "a.jpg"), b"first"),
            unreadable(item("m2", "b.jpg"), dir.path()),
            fetched(item("m3", "c.jpg"), b"third"),
        ];
        for (index, outcome) in outcomes.into_iter().enumerate() {
            let stop = dl.record(&album, index, outcome, &mut writer, &mut report).await;
            assert!(stop.is_none(), "item {index} stopped the album");
        }
        writer.take().unwrap().finalize().unwrap();

        assert_eq!(report.entries, vec!["a.jpg", "c.jpg"]);
        assert_eq!(zip_names(&path), report.entries);
        let failed: Vec<_> = report.failed_items().map(|(i, k)| (i.id.clone(), k)).collect();
        assert_eq!(failed, vec![("m2".to_string(), ErrorKind::StorageError)]);
        assert_eq!(report.succeeded + failed.len(), 3);
    }

    #[tokio::test]
    async fn spool_and_entry_failures_in_a_row_abort_the_album() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Trip2024.zip");
        let dl = downloader();
        let album = album();
        let mut writer = Some(ArchiveWriter::create(&path, false).unwrap());
        let mut report = AlbumReport::new(album.clone());

        let stop = dl
            .record(&album, 0, fetched(item("m1", "a.jpg"), b"ok"), &mut writer, &mut report)
            .await;
        assert!(stop.is_none());
        let stop = dl
            .record(&album, 1, spool_failure(item("m2", "b.jpg")), &mut writer, &mut report)
            .await;
        assert!(stop.is_none(), "first storage failure only skips the item");

        let unreadable = unreadable(item("m3", "c.jpg"), dir.path());
        let stop = dl.record(&album, 2, unreadable, &mut writer, &mut report).await;
        assert!(matches!(stop, Some(Stop::Early(AlbumStatus::Aborted))));
        assert!(report.aborted_reason.is_some());

        writer.take().unwrap().finalize().unwrap();
        assert_eq!(zip_names(&path), vec!["a.jpg"]);
        assert_eq!(report.succeeded + report.failed_items().count(), 3);
    }
}
