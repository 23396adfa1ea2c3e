//! Listing source port
//!
//! Paginated access to the child blocks of a container (page). The
//! listing cache walks the cursor to exhaustion and keeps file-bearing
//! blocks only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::newtypes::PageId;
use crate::ports::remote_store::RemoteError;

/// Block types that carry a downloadable file.
pub const FILE_BLOCK_TYPES: &[&str] = &["file", "image", "video", "pdf", "audio"];

/// One child block as returned by the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingItem {
    /// Block identifier
    pub id: String,
    /// Block `type`, e.g. `file`, `paragraph`
    pub block_type: String,
    /// Caption text of the block, if any
    pub caption: Option<String>,
    /// File name stored on the block, if any
    pub name: Option<String>,
    /// Signed download URL for file-bearing blocks
    pub url: Option<String>,
}

impl ListingItem {
    /// Returns true if the block carries a file
    pub fn is_file(&self) -> bool {
        FILE_BLOCK_TYPES.contains(&self.block_type.as_str())
    }

    /// Name shown to users: caption, then stored name, then the URL's last
    /// path segment, then `"untitled"`.
    pub fn display_name(&self) -> String {
        let non_empty = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        non_empty(&self.caption)
            .or_else(|| non_empty(&self.name))
            .or_else(|| {
                self.url.as_deref().and_then(|url| {
                    let path = url.split(['?', '#']).next().unwrap_or(url);
                    path.rsplit('/')
                        .next()
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                })
            })
            .unwrap_or_else(|| "untitled".to_string())
    }
}

/// One page of a child listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub items: Vec<ListingItem>,
    /// Cursor for the next page; `None` on the last page
    pub next_cursor: Option<String>,
}

/// A downloadable file in a container listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRow {
    pub name: String,
    pub url: String,
    /// When the listing holding this row was fetched
    pub fetched_at: DateTime<Utc>,
}

/// Paginated child listing
#[async_trait::async_trait]
pub trait IListingSource: Send + Sync {
    /// Fetches one page of children of `container`, starting at `cursor`
    async fn list_children(
        &self,
        container: &PageId,
        cursor: Option<&str>,
    ) -> Result<ListingPage, RemoteError>;
}
