//! Resumable downloads of listed files
//!
//! A file is streamed to `<dir>/<name>.downloading` and renamed to
//! `<dir>/<name>` once the body is complete. When the partial file already
//! exists the request carries `Range: bytes=<len>-`; a `206` answer is
//! appended, a `200` answer restarts the file.
//!
//! Listing URLs are signed and expire, so [`Downloader::resolve_row`] refreshes
//! the listing when the cached copy is close to expiry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use notionfm_cache::ListingCache;
use notionfm_core::domain::PageId;
use notionfm_core::ports::ListingRow;

use crate::{Result, TransferError};

/// Suffix of a download in progress
pub const PARTIAL_SUFFIX: &str = ".downloading";

/// Progress callback `(bytes_on_disk, total_bytes)`
pub type DownloadProgress = Box<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Streams listing rows to local files
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    /// Creates a downloader whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Finds `name` in the listing of `container`
    ///
    /// Uses the cached listing unless it is missing or close to expiry, in
    /// which case the listing is fetched again first.
    pub async fn resolve_row(
        &self,
        cache: &ListingCache,
        container: &PageId,
        name: &str,
    ) -> Result<ListingRow> {
        if cache.is_stale_soon(container) {
            return self.refresh_row(cache, container, name).await;
        }
        let rows = cache.list(container, false).await?;
        find_row(rows, name)
    }

    /// Refetches the listing of `container` and returns the row named `name`
    pub async fn refresh_row(
        &self,
        cache: &ListingCache,
        container: &PageId,
        name: &str,
    ) -> Result<ListingRow> {
        debug!(container = %container, name, "Refreshing listing for a fresh URL");
        let rows = cache.list(container, true).await?;
        find_row(rows, name)
    }

    /// Downloads `row` into `dir` and returns the final path
    pub async fn download(
        &self,
        row: &ListingRow,
        dir: &Path,
        progress: Option<DownloadProgress>,
    ) -> Result<PathBuf> {
        let name = safe_file_name(&row.name);
        let target = dir.join(&name);
        let partial = dir.join(format!("{name}{PARTIAL_SUFFIX}"));
        fs::create_dir_all(dir).await?;

        let mut resume_from = match fs::metadata(&partial).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut request = self.client.get(&row.url);
        if resume_from > 0 {
            request = request.header(RANGE, format!("bytes={resume_from}-"));
        }
        let response = request.send().await?;
        let status = response.status();

        let mut file = match status {
            StatusCode::PARTIAL_CONTENT if resume_from > 0 => {
                info!(file = %name, offset = resume_from, "Resuming download");
                OpenOptions::new().append(true).open(&partial).await?
            }
            StatusCode::RANGE_NOT_SATISFIABLE if resume_from > 0 => {
                // The partial file already holds the whole body
                fs::rename(&partial, &target).await?;
                info!(file = %name, bytes = resume_from, "Download already complete");
                return Ok(target);
            }
            s if s.is_success() => {
                if resume_from > 0 {
                    warn!(file = %name, "Server ignored the range request, restarting download");
                    resume_from = 0;
                }
                fs::File::create(&partial).await?
            }
            s => {
                return Err(TransferError::DownloadStatus {
                    status: s.as_u16(),
                    url: row.url.clone(),
                })
            }
        };

        let total = response.content_length().map(|len| len + resume_from);
        let mut written = resume_from;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            file.write_all(&bytes).await?;
            written += bytes.len() as u64;
            if let Some(cb) = &progress {
                cb(written, total);
            }
        }
        file.flush().await?;
        drop(file);

        fs::rename(&partial, &target).await?;
        info!(file = %name, bytes = written, path = %target.display(), "Download finished");
        Ok(target)
    }
}

fn find_row(rows: Vec<ListingRow>, name: &str) -> Result<ListingRow> {
    rows.into_iter()
        .find(|r| r.name == name)
        .ok_or_else(|| TransferError::NotFound(name.to_string()))
}

/// Last path component of `name`, so a caption cannot escape the target dir
fn safe_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("download")
        .to_string()
}
