//! Streaming zip archive for one album
//!
//! Entries are copied from their spool files straight into the container, so
//! memory stays flat whatever the item size. The archive is finalized exactly
//! once: explicitly through [`ArchiveWriter::finalize`], or on drop when an
//! album run ends early.

use crate::error::ArchiveError;
use crate::types::MediaKind;
use crate::utils::resolve_entry_name;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Storage failures in a row that abort the album
const MAX_CONSECUTIVE_FAILURES: u32 = 2;

/// One entry written to the archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Name inside the archive, unique (case-insensitively) within it
    pub name: String,
    /// Uncompressed size
    pub bytes: u64,
}

/// Writes one album's zip file
pub struct ArchiveWriter {
    path: PathBuf,
    zip: Option<ZipWriter<BufWriter<File>>>,
    /// Lowercased names already written
    taken: HashSet<String>,
    entries: Vec<String>,
    consecutive_failures: u32,
}

impl ArchiveWriter {
    /// Create the archive file
    ///
    /// Unless `overwrite` is set, an existing file at `path` is an error.
    pub fn create(path: &Path, overwrite: bool) -> Result<Self, ArchiveError> {
        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }

        let file = options.open(path).map_err(|source| ArchiveError::Create {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), "archive created");
        Ok(Self {
            path: path.to_path_buf(),
            zip: Some(ZipWriter::new(BufWriter::new(file))),
            taken: HashSet::new(),
            entries: Vec::new(),
            consecutive_failures: 0,
        })
    }

    /// Archive file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names written so far, in write order
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Whether [`ArchiveWriter::finalize`] has run
    pub fn is_finalized(&self) -> bool {
        self.zip.is_none()
    }

    /// Stream `payload` into a new entry
    ///
    /// A name already used in this archive gets `-1`, `-2`, ... before its
    /// extension. Photos are deflated; videos are stored as-is since they are
    /// already compressed.
    ///
    /// # Errors
    ///
    /// A failed write removes the partial entry and returns
    /// [`ArchiveError::Entry`]; the archive stays usable. A second failure in
    /// a row returns [`ArchiveError::RepeatedStorageFailure`] and the caller
    /// must stop adding entries.
    pub fn add_entry<R: Read>(
        &mut self,
        name: &str,
        kind: MediaKind,
        payload: &mut R,
    ) -> Result<ArchiveEntry, ArchiveError> {
        let zip = self
            .zip
            .as_mut()
            .ok_or_else(|| ArchiveError::Closed(self.path.clone()))?;

        let resolved = resolve_entry_name(&self.taken, name);
        let method = match kind {
            MediaKind::Video => CompressionMethod::Stored,
            MediaKind::Photo | MediaKind::Other => CompressionMethod::Deflated,
        };
        let options = SimpleFileOptions::default()
            .compression_method(method)
            .large_file(true)
            .unix_permissions(0o644);

        match write_entry(zip, &resolved, options, payload) {
            Ok(bytes) => {
                self.consecutive_failures = 0;
                self.taken.insert(resolved.to_lowercase());
                self.entries.push(resolved.clone());
                tracing::debug!(entry = %resolved, bytes, "entry written");
                Ok(ArchiveEntry {
                    name: resolved,
                    bytes,
                })
            }
            Err(source) => {
                if self.note_storage_failure() {
                    tracing::error!(
                        entry = %resolved,
                        consecutive = self.consecutive_failures,
                        error = %source,
                        "repeated storage failure"
                    );
                    Err(ArchiveError::RepeatedStorageFailure {
                        consecutive: self.consecutive_failures,
                        name: resolved,
                        source,
                    })
                } else {
                    tracing::warn!(entry = %resolved, error = %source, "entry write failed");
                    Err(ArchiveError::Entry {
                        name: resolved,
                        source,
                    })
                }
            }
        }
    }

    /// Count a storage failure that happened before the bytes reached the
    /// archive, such as a failed spool write
    ///
    /// Returns `true` once the failures in a row reach the abort threshold.
    /// Only a written entry resets the streak.
    pub fn note_storage_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES
    }

    /// Write the central directory and flush the file
    ///
    /// Calling it again is a no-op.
    pub fn finalize(&mut self) -> Result<(), ArchiveError> {
        let Some(zip) = self.zip.take() else {
            return Ok(());
        };

        let finalize_err = |reason: String| ArchiveError::Finalize {
            path: self.path.clone(),
            reason,
        };

        let mut out = zip.finish().map_err(|e| finalize_err(e.to_string()))?;
        out.flush().map_err(|e| finalize_err(e.to_string()))?;
        out.get_ref()
            .sync_all()
            .map_err(|e| finalize_err(e.to_string()))?;

        tracing::info!(
            path = %self.path.display(),
            entries = self.entries.len(),
            "archive finalized"
        );
        Ok(())
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            tracing::warn!(error = %e, "failed to finalize archive on drop");
        }
    }
}

fn write_entry<W: Write + Seek, R: Read>(
    zip: &mut ZipWriter<W>,
    name: &str,
    options: SimpleFileOptions,
    payload: &mut R,
) -> io::Result<u64> {
    zip.start_file(name, options).map_err(zip_to_io)?;
    match io::copy(payload, zip) {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            if let Err(abort) = zip.abort_file() {
                tracing::warn!(entry = name, error = %abort, "failed to remove partial entry");
            }
            Err(e)
        }
    }
}

fn zip_to_io(e: ZipError) -> io::Error {
    match e {
        ZipError::Io(e) => e,
        other => io::Error::other(other),
    }
}
