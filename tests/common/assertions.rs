//! Assertions over finished album archives

use photos_dl::AlbumReport;
use std::io::Read;
use std::path::Path;

/// Entry names of a zip archive, in central-directory order
pub fn archive_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).expect("archive should exist");
    let mut archive = zip::ZipArchive::new(file).expect("archive should be a valid zip");
    (0..archive.len())
        .map(|i| archive.by_index(i).expect("entry readable").name().to_string())
        .collect()
}

/// Contents of one archive entry
pub fn archive_entry(path: &Path, name: &str) -> Vec<u8> {
    let file = std::fs::File::open(path).expect("archive should exist");
    let mut archive = zip::ZipArchive::new(file).expect("archive should be a valid zip");
    let mut entry = archive.by_name(name).expect("entry should exist");
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).expect("entry should extract");
    buf
}

/// Every enumerated item ended as exactly one entry or exactly one failure
pub fn assert_accounted(report: &AlbumReport, enumerated: usize) {
    assert_eq!(
        report.succeeded + report.failed_items().count(),
        enumerated,
        "entries plus failures must equal enumerated items: {:?}",
        report
    );
    assert_eq!(report.entries.len(), report.succeeded);
    if let Some(path) = &report.archive {
        assert_eq!(archive_entries(path), report.entries);
    }
}
