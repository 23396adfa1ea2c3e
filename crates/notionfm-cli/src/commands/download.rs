//! Download command - Fetch a file attached to a page
//!
//! The file is looked up by display name in the page listing. A download
//! interrupted earlier resumes from its partial file. When the signed URL
//! has expired (HTTP 403) the listing is refetched once for a fresh URL.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use notionfm_cache::ListingCache;
use notionfm_transfer::download::{DownloadProgress, Downloader};
use notionfm_transfer::TransferError;
use tracing::warn;

use super::{parse_page, Context};
use crate::output::{format_bytes, get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct DownloadCommand {
    /// Page the file is attached to
    #[arg(long)]
    pub page: String,

    /// Display name of the file
    #[arg(long)]
    pub name: String,

    /// Target directory
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Whole-transfer timeout in seconds
    #[arg(long, default_value_t = 3600)]
    pub timeout: u64,
}

impl DownloadCommand {
    pub async fn execute(&self, format: OutputFormat, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(format.is_json());
        let page = parse_page(&self.page)?;
        let cache = ListingCache::from_config(ctx.remote_store()?, &ctx.config.listing_cache);
        let downloader = Downloader::new(Duration::from_secs(self.timeout))?;

        let row = downloader.resolve_row(&cache, &page, &self.name).await?;
        let target = match downloader.download(&row, &self.dir, self.progress(format, ctx)).await {
            Err(TransferError::DownloadStatus { status: 403, .. }) => {
                warn!(name = %self.name, "Download URL rejected, refreshing listing");
                let row = downloader.refresh_row(&cache, &page, &self.name).await?;
                downloader.download(&row, &self.dir, self.progress(format, ctx)).await?
            }
            other => other?,
        };

        let size = tokio::fs::metadata(&target).await?.len();
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "name": self.name,
                "path": target.display().to_string(),
                "bytes": size,
            }));
        } else {
            formatter.success(&format!(
                "Downloaded {} ({})",
                target.display(),
                format_bytes(size)
            ));
        }
        Ok(())
    }

    fn progress(&self, format: OutputFormat, ctx: &Context) -> Option<DownloadProgress> {
        if ctx.quiet || format.is_json() {
            return None;
        }
        let name = self.name.clone();
        Some(Box::new(move |done: u64, total: Option<u64>| {
            let shown = total.map(format_bytes).unwrap_or_else(|| "?".to_string());
            eprint!("\r  {}: {} / {}", name, format_bytes(done), shown);
            if total == Some(done) {
                eprintln!();
            }
        }))
    }
}
