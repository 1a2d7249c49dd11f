//! Utility functions for names, paths, and HTTP header parsing

use crate::config::ExistingArchive;
use crate::types::{Album, MediaItem};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum number of rename attempts when resolving archive path collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Turn an album title into a file-system-safe archive stem
///
/// Keeps alphanumerics, spaces, `_` and `-`, drops trailing whitespace, and
/// falls back to `Album_<id>` when nothing survives.
///
/// # Examples
///
/// ```
/// use photos_dl::utils::sanitize_album_title;
///
/// assert_eq!(sanitize_album_title("Trip: 2024!", "A1"), "Trip 2024");
/// assert_eq!(sanitize_album_title("???", "A1"), "Album_A1");
/// ```
pub fn sanitize_album_title(title: &str, album_id: &str) -> String {
    let safe: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    let safe = safe.trim_end();
    if safe.is_empty() {
        format!("Album_{}", album_id)
    } else {
        safe.to_string()
    }
}

/// Entry name for a media item before collision handling
///
/// Path separators and control characters become `_` so an entry can never
/// escape the extraction directory. Items without a usable name become
/// `untitled_<id>`.
pub fn sanitize_entry_name(item: &MediaItem) -> String {
    let cleaned: String = item
        .filename
        .chars()
        .map(|c| {
            if matches!(c, '/' | '\\') || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        format!("untitled_{}", item.id)
    } else {
        cleaned.to_string()
    }
}

/// Pick a name not yet used in an archive
///
/// `taken` holds lowercased names already written. On collision a numeric
/// disambiguator goes before the extension: `IMG.jpg`, `IMG-1.jpg`, `IMG-2.jpg`.
/// Comparison is case-insensitive so extraction on case-insensitive file
/// systems cannot clobber entries.
///
/// # Examples
///
/// ```
/// use photos_dl::utils::resolve_entry_name;
/// use std::collections::HashSet;
///
/// let mut taken = HashSet::new();
/// taken.insert("img.jpg".to_string());
/// assert_eq!(resolve_entry_name(&taken, "IMG.jpg"), "IMG-1.jpg");
/// assert_eq!(resolve_entry_name(&taken, "other.jpg"), "other.jpg");
/// ```
pub fn resolve_entry_name(taken: &HashSet<String>, name: &str) -> String {
    if !taken.contains(&name.to_lowercase()) {
        return name.to_string();
    }

    // A leading dot (".hidden") is part of the stem, not an extension separator
    let (stem, extension) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    };

    let mut n: u64 = 1;
    loop {
        let candidate = match extension {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        };
        if !taken.contains(&candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

/// Decide where an album's archive goes, honoring the existing-archive policy
///
/// Returns `None` when an archive already exists and the policy is
/// [`ExistingArchive::Skip`].
pub fn archive_path_for(
    output_dir: &Path,
    album: &Album,
    policy: ExistingArchive,
) -> Option<PathBuf> {
    let stem = sanitize_album_title(&album.title, &album.id);
    let path = output_dir.join(format!("{}.zip", stem));

    match policy {
        ExistingArchive::Overwrite => Some(path),
        ExistingArchive::Skip => {
            if path.exists() {
                None
            } else {
                Some(path)
            }
        }
        ExistingArchive::Rename => {
            if !path.exists() {
                return Some(path);
            }
            // Try adding (1), (2), (3), ... until we find a unique name
            for i in 1..=MAX_RENAME_ATTEMPTS {
                let candidate = output_dir.join(format!("{} ({}).zip", stem, i));
                if !candidate.exists() {
                    return Some(candidate);
                }
            }
            None
        }
    }
}

/// Parse an HTTP `Retry-After` value: delay-seconds or an HTTP-date
///
/// Dates in the past yield a zero delay.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
