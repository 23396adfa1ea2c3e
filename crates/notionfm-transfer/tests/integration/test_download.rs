//! Downloader tests against a wiremock file host

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use notionfm_cache::ListingCache;
use notionfm_core::domain::PageId;
use notionfm_core::ports::{IListingSource, ListingItem, ListingPage, ListingRow, RemoteError};
use notionfm_transfer::download::{Downloader, PARTIAL_SUFFIX};
use notionfm_transfer::TransferError;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BODY: &[u8] = b"0123456789abcdef";

fn row(server: &MockServer, name: &str) -> ListingRow {
    ListingRow {
        name: name.to_string(),
        url: format!("{}/files/{name}", server.uri()),
        fetched_at: Utc::now(),
    }
}

fn downloader() -> Downloader {
    Downloader::new(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_download_writes_file_and_removes_partial() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/a.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let target = downloader()
        .download(
            &row(&server, "a.bin"),
            dir.path(),
            Some(Box::new(move |done: u64, total: Option<u64>| sink.lock().unwrap().push((done, total)))),
        )
        .await
        .unwrap();

    assert_eq!(target, dir.path().join("a.bin"));
    assert_eq!(std::fs::read(&target).unwrap(), BODY);
    assert!(!dir.path().join(format!("a.bin{PARTIAL_SUFFIX}")).exists());
    let seen = seen.lock().unwrap();
    assert_eq!(*seen.last().unwrap(), (BODY.len() as u64, Some(BODY.len() as u64)));
}

#[tokio::test]
async fn test_partial_file_is_resumed_with_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/b.bin"))
        .and(header("Range", "bytes=6-"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(&BODY[6..]))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(format!("b.bin{PARTIAL_SUFFIX}")), &BODY[..6]).unwrap();

    let target = downloader()
        .download(&row(&server, "b.bin"), dir.path(), None)
        .await
        .unwrap();

    assert_eq!(std::fs::read(target).unwrap(), BODY);
}

#[tokio::test]
async fn test_ignored_range_restarts_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/c.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(format!("c.bin{PARTIAL_SUFFIX}")), b"stale").unwrap();

    let target = downloader()
        .download(&row(&server, "c.bin"), dir.path(), None)
        .await
        .unwrap();

    assert_eq!(std::fs::read(target).unwrap(), BODY);
}

#[tokio::test]
async fn test_unsatisfiable_range_means_partial_is_complete() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/d.bin"))
        .respond_with(ResponseTemplate::new(416))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(format!("d.bin{PARTIAL_SUFFIX}")), BODY).unwrap();

    let target = downloader()
        .download(&row(&server, "d.bin"), dir.path(), None)
        .await
        .unwrap();

    assert_eq!(std::fs::read(target).unwrap(), BODY);
}

#[tokio::test]
async fn test_expired_url_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let err = downloader()
        .download(&row(&server, "e.bin"), dir.path(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::DownloadStatus { status: 403, .. }));
    assert!(!dir.path().join("e.bin").exists());
}

/// Listing with one file whose URL changes on every fetch
struct RotatingSource {
    fetches: AtomicUsize,
}

#[async_trait::async_trait]
impl IListingSource for RotatingSource {
    async fn list_children(
        &self,
        _container: &PageId,
        _cursor: Option<&str>,
    ) -> Result<ListingPage, RemoteError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(ListingPage {
            items: vec![ListingItem {
                id: "blk".into(),
                block_type: "file".into(),
                caption: Some("movie.mkv".into()),
                name: Some("movie.mkv.txt".into()),
                url: Some(format!("https://files.example/movie?sig={n}")),
            }],
            next_cursor: None,
        })
    }
}

#[tokio::test]
async fn test_resolve_and_refresh_row() {
    let source = Arc::new(RotatingSource {
        fetches: AtomicUsize::new(0),
    });
    let cache = ListingCache::new(
        source.clone(),
        Duration::from_secs(2400),
        Duration::from_secs(1800),
    );
    let page = PageId::new("container").unwrap();
    let downloader = downloader();

    // Nothing cached yet counts as stale, so the first lookup fetches
    let first = downloader.resolve_row(&cache, &page, "movie.mkv").await.unwrap();
    let again = downloader.resolve_row(&cache, &page, "movie.mkv").await.unwrap();
    assert_eq!(first.url, again.url);
    assert_eq!(cache.fetch_count(), 1);

    let fresh = downloader.refresh_row(&cache, &page, "movie.mkv").await.unwrap();
    assert_ne!(fresh.url, first.url);
    assert_eq!(cache.fetch_count(), 2);

    let err = downloader
        .resolve_row(&cache, &page, "other.pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::NotFound(_)));
}
