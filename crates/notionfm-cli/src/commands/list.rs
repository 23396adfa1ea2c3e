//! List command - Show the files attached to a page

use anyhow::Result;
use clap::Args;
use notionfm_cache::ListingCache;
use notionfm_core::ports::ListingRow;
use tracing::info;

use super::{parse_page, Context};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct ListCommand {
    /// Page whose files are listed
    #[arg(long)]
    pub page: String,

    /// Bypass any cached listing
    #[arg(long)]
    pub refresh: bool,

    /// Print the signed download URL of each file
    #[arg(long)]
    pub urls: bool,
}

impl ListCommand {
    pub async fn execute(&self, format: OutputFormat, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(format.is_json());
        let page = parse_page(&self.page)?;
        let cache = ListingCache::from_config(ctx.remote_store()?, &ctx.config.listing_cache);

        let rows = cache.list(&page, self.refresh).await?;
        info!(page = %page, files = rows.len(), "Listed page");

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "page": page.as_str(),
                "files": rows.iter().map(row_json).collect::<Vec<_>>(),
            }));
            return Ok(());
        }

        if rows.is_empty() {
            formatter.info("No files attached to this page");
            return Ok(());
        }
        formatter.success(&format!("{} file(s) on {}", rows.len(), page));
        for row in &rows {
            formatter.info(&row.name);
            if self.urls {
                formatter.info(&format!("  {}", row.url));
            }
        }
        if self.urls {
            formatter.warn(&format!(
                "Download URLs expire; refresh the listing within {} minutes",
                ctx.config.listing_cache.stale_warning_minutes
            ));
        }
        Ok(())
    }
}

fn row_json(row: &ListingRow) -> serde_json::Value {
    serde_json::json!({
        "name": row.name,
        "url": row.url,
        "fetched_at": row.fetched_at.to_rfc3339(),
    })
}
