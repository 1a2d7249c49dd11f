//! End-to-end album runs against a mock library
//!
//! Each test drives the public `AlbumDownloader` API the way the CLI does and
//! inspects the archive left on disk.

mod common;

use common::*;
use photos_dl::{AlbumStatus, Error, ErrorKind, Event};
use wiremock::ResponseTemplate;
use wiremock::matchers::{method, path};

#[tokio::test]
async fn slow_item_fails_after_three_attempts_and_album_completes() {
    let lib = Library::start().await;
    lib.albums(&[("A1", "Trip2024", 2)]).await;
    lib.album_media("A1", &[("m1", "beach.jpg"), ("m2", "sunset.jpg")])
        .mount(&lib.server)
        .await;
    lib.serve("m1", b"beach bytes").await;
    lib.stall("m2").expect(3).mount(&lib.server).await;

    let downloader = lib.downloader();
    let report = downloader.download_album_by_id("A1").await.unwrap();

    assert_eq!(report.status, AlbumStatus::Complete);
    assert_eq!(report.succeeded, 1);
    let failed: Vec<_> = report.failed_items().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0.id, "m2");
    assert_eq!(failed[0].1, ErrorKind::Network);

    let archive = report.archive.clone().expect("archive kept");
    assert_eq!(archive, lib.out.path().join("Trip2024.zip"));
    assert_eq!(archive_entries(&archive), vec!["beach.jpg".to_string()]);
    assert_eq!(archive_entry(&archive, "beach.jpg"), b"beach bytes");
    assert_accounted(&report, 2);
}

#[tokio::test]
async fn mixed_album_accounts_for_every_item() {
    let lib = Library::start().await;
    lib.albums(&[("A1", "Mixed", 4)]).await;
    lib.album_media(
        "A1",
        &[
            ("m1", "IMG_1.jpg"),
            ("m2", "gone.jpg"),
            ("m3", "img_1.JPG"),
            ("m4", "flaky.jpg"),
        ],
    )
    .mount(&lib.server)
    .await;
    lib.serve("m1", b"first").await;
    lib.bytes_of("m2")
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&lib.server)
        .await;
    lib.serve("m3", b"second").await;
    lib.bytes_of("m4")
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&lib.server)
        .await;

    let downloader = lib.downloader();
    let report = downloader.download_album_by_id("A1").await.unwrap();

    assert_eq!(report.status, AlbumStatus::Complete);
    assert_eq!(
        report.entries,
        vec!["IMG_1.jpg".to_string(), "img_1-1.JPG".to_string()]
    );
    let kinds: Vec<_> = report.failed_items().map(|(i, k)| (i.id.clone(), k)).collect();
    assert_eq!(
        kinds,
        vec![
            ("m2".to_string(), ErrorKind::ClientRejected),
            ("m4".to_string(), ErrorKind::ServerError),
        ]
    );
    assert_accounted(&report, 4);
    assert_eq!(report.enumerated(), 4);

    let archive = report.archive.as_ref().unwrap();
    assert_eq!(archive_entry(archive, "img_1-1.JPG"), b"second");
}

#[tokio::test]
async fn failures_across_pages_keep_listing_order() {
    let lib = Library::start().await;
    lib.albums(&[("A1", "Mixed", 5)]).await;
    lib.media_page(
        "A1",
        Some("p2"),
        &[("m3", "flaky.jpg"), ("m4", "b.jpg"), ("m5", "a.jpg")],
        None,
    )
    .expect(1)
    .mount(&lib.server)
    .await;
    lib.media_page("A1", None, &[("m1", "a.jpg"), ("m2", "gone.jpg")], Some("p2"))
        .expect(1)
        .mount(&lib.server)
        .await;
    lib.serve("m1", b"one").await;
    lib.bytes_of("m2")
        .respond_with(ResponseTemplate::new(404))
        .mount(&lib.server)
        .await;
    lib.bytes_of("m3")
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&lib.server)
        .await;
    lib.serve("m4", b"four").await;
    lib.serve("m5", b"five").await;

    let downloader = lib.downloader();
    let mut events = downloader.subscribe();
    let report = downloader.download_album_by_id("A1").await.unwrap();

    assert_eq!(report.status, AlbumStatus::Complete);
    assert_eq!(report.entries, vec!["a.jpg", "b.jpg", "a-1.jpg"]);
    let failed: Vec<_> = report.failed_items().map(|(i, _)| i.id.clone()).collect();
    assert_eq!(failed, vec!["m2", "m3"]);
    assert_accounted(&report, 5);

    let archive = report.archive.as_ref().unwrap();
    assert_eq!(archive_entry(archive, "a-1.jpg"), b"five");

    // Outcomes arrive in listing order, successes and failures interleaved
    let mut order = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            Event::ItemDownloaded { index, .. } | Event::ItemFailed { index, .. } => {
                order.push(index)
            }
            _ => {}
        }
    }
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn rejected_credentials_stop_the_whole_run() {
    let lib = Library::start().await;
    wiremock::Mock::given(method("GET"))
        .and(path("/v1/albums"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&lib.server)
        .await;
    lib.album_media("A1", &[]).expect(0).mount(&lib.server).await;

    let downloader = lib.downloader();
    let err = downloader.download_all().await.unwrap_err();

    assert!(err.is_fatal(), "expected a fatal error, got {err:?}");
    assert!(matches!(err, Error::Auth(_) | Error::Catalog(_)));
    let leftover = std::fs::read_dir(lib.out.path())
        .map(|dir| dir.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn download_all_writes_one_archive_per_album() {
    let lib = Library::start().await;
    lib.albums(&[("A1", "Trip2024", 1), ("A2", "Pets", 1)]).await;
    lib.album_media("A1", &[("m1", "a.jpg")])
        .mount(&lib.server)
        .await;
    lib.album_media("A2", &[("m2", "b.jpg")])
        .mount(&lib.server)
        .await;
    lib.serve("m1", b"a").await;
    lib.serve("m2", b"b").await;

    let downloader = lib.downloader();
    let mut events = downloader.subscribe();
    let summary = downloader.download_all().await.unwrap();

    assert_eq!(summary.reports.len(), 2);
    assert!(summary.errors.is_empty());
    assert!(summary.listing_error.is_none());
    assert_eq!(summary.total_succeeded(), 2);
    assert_eq!(summary.total_failed(), 0);

    for report in &summary.reports {
        assert_eq!(report.status, AlbumStatus::Complete);
        assert_accounted(report, 1);
    }
    assert!(lib.out.path().join("Trip2024.zip").is_file());
    assert!(lib.out.path().join("Pets.zip").is_file());

    let mut finished = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::AlbumFinished { album_id, .. } = event {
            finished.push(album_id);
        }
    }
    assert_eq!(finished, vec!["A1".to_string(), "A2".to_string()]);
}
