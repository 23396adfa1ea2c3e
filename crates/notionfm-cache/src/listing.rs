//! Per-container listing cache
//!
//! Entries are keyed by container id, so several pages can be cached at
//! once. An entry is replaced wholesale on refresh; readers get a copy.
//! The entry map lock is held only to read or replace an entry, never
//! while fetching.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use notionfm_core::config::ListingCacheConfig;
use notionfm_core::domain::PageId;
use notionfm_core::ports::{IListingSource, ListingRow};

use crate::CacheError;

/// One cached listing
#[derive(Debug, Clone)]
struct CacheEntry {
    rows: Vec<ListingRow>,
    fetched_at: Instant,
}

/// TTL cache of file listings over an [`IListingSource`]
pub struct ListingCache {
    source: Arc<dyn IListingSource>,
    ttl: Duration,
    stale_warning: Duration,
    entries: Mutex<HashMap<PageId, CacheEntry>>,
    fetches: AtomicU64,
}

impl std::fmt::Debug for ListingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListingCache")
            .field("ttl", &self.ttl)
            .field("stale_warning", &self.stale_warning)
            .field("fetches", &self.fetch_count())
            .finish()
    }
}

impl ListingCache {
    /// Creates a cache; `stale_warning` is clamped to `ttl`.
    pub fn new(source: Arc<dyn IListingSource>, ttl: Duration, stale_warning: Duration) -> Self {
        Self {
            source,
            ttl,
            stale_warning: stale_warning.min(ttl),
            entries: Mutex::new(HashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn from_config(source: Arc<dyn IListingSource>, config: &ListingCacheConfig) -> Self {
        Self::new(source, config.ttl(), config.stale_warning())
    }

    /// Returns the file rows of `container`
    ///
    /// Serves the cached copy unless it is missing, older than the TTL, or
    /// `force_refresh` is set; otherwise fetches the full listing and
    /// replaces the entry.
    pub async fn list(
        &self,
        container: &PageId,
        force_refresh: bool,
    ) -> Result<Vec<ListingRow>, CacheError> {
        if !force_refresh {
            if let Some((rows, age)) = self.cached(container) {
                if age >= self.stale_warning {
                    warn!(
                        container = %container,
                        age_secs = age.as_secs(),
                        "Serving listing close to expiry; download URLs may soon stop working"
                    );
                } else {
                    debug!(container = %container, age_secs = age.as_secs(), "Listing cache hit");
                }
                return Ok(rows);
            }
        }

        let rows = self.fetch_all(container).await?;
        let entry = CacheEntry {
            rows: rows.clone(),
            fetched_at: Instant::now(),
        };
        self.entries
            .lock()
            .unwrap()
            .insert(container.clone(), entry);
        Ok(rows)
    }

    /// Copy of a live (unexpired) entry and its age
    fn cached(&self, container: &PageId) -> Option<(Vec<ListingRow>, Duration)> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(container)?;
        let age = entry.fetched_at.elapsed();
        (age < self.ttl).then(|| (entry.rows.clone(), age))
    }

    /// Walks the cursor to exhaustion, keeping file-bearing blocks with a URL
    async fn fetch_all(&self, container: &PageId) -> Result<Vec<ListingRow>, CacheError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let fetched_at = Utc::now();
        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let page = self
                .source
                .list_children(container, cursor.as_deref())
                .await?;
            pages += 1;

            rows.extend(page.items.into_iter().filter(|i| i.is_file()).filter_map(|item| {
                let name = item.display_name();
                item.url.map(|url| ListingRow {
                    name,
                    url,
                    fetched_at,
                })
            }));

            match page.next_cursor {
                Some(next) => {
                    if !seen.insert(next.clone()) {
                        return Err(CacheError::PaginationLoop(next));
                    }
                    cursor = Some(next);
                }
                None => break,
            }
        }

        info!(container = %container, files = rows.len(), pages, "Fetched listing");
        Ok(rows)
    }

    /// True when the cached entry is past the warning threshold (or gone)
    pub fn is_stale_soon(&self, container: &PageId) -> bool {
        self.age(container)
            .map(|age| age >= self.stale_warning)
            .unwrap_or(true)
    }

    /// Age of the cached entry, if any
    pub fn age(&self, container: &PageId) -> Option<Duration> {
        let entries = self.entries.lock().unwrap();
        entries.get(container).map(|e| e.fetched_at.elapsed())
    }

    /// Drops the entry for `container`
    pub fn invalidate(&self, container: &PageId) {
        if self.entries.lock().unwrap().remove(container).is_some() {
            debug!(container = %container, "Listing cache entry invalidated");
        }
    }

    /// Drops every entry
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Number of full listing fetches performed so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
