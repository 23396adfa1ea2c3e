//! notionfm Cache - TTL cache of remote file listings
//!
//! Signed download URLs in a listing expire about an hour after they are
//! issued, so listings are cached for a bounded time and refetched after.
//!
//! ## Key Components
//!
//! - [`ListingCache`] - Per-container cache over an `IListingSource`
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use notionfm_cache::ListingCache;
//! use notionfm_core::config::ListingCacheConfig;
//! use notionfm_core::domain::PageId;
//! # use notionfm_core::ports::IListingSource;
//!
//! # async fn example(source: Arc<dyn IListingSource>) -> Result<(), notionfm_cache::CacheError> {
//! let cache = ListingCache::from_config(source, &ListingCacheConfig::default());
//! let rows = cache.list(&PageId::new("page-id").unwrap(), false).await?;
//! println!("{} files", rows.len());
//! # Ok(())
//! # }
//! ```

pub mod listing;

pub use listing::ListingCache;

use notionfm_core::ports::RemoteError;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Fetching a listing page failed
    #[error("Listing fetch failed: {0}")]
    Fetch(#[from] RemoteError),

    /// The remote returned a cursor that was already visited
    #[error("Pagination loop detected at cursor {0}")]
    PaginationLoop(String),
}
