//! Client-side throttling for the Notion API
//!
//! Notion averages about three requests per second per integration and
//! answers bursts above that with 429. [`TokenBucket::acquire`] is awaited
//! before every attempt, retries included, so the client stays under the
//! limit instead of discovering it.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use notionfm_notion::rate_limit::TokenBucket;
//!
//! # async fn demo() {
//! let shared = Arc::new(TokenBucket::new(3, 2.8));
//! let waited = shared.acquire().await;
//! assert!(waited.as_secs() < 1);
//! # }
//! ```

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

/// Upper bound accepted for an HTTP-date `Retry-After`
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct BucketLevel {
    tokens: f64,
    refreshed_at: Instant,
}

/// Continuously refilling token bucket
///
/// Holds up to `capacity` tokens and gains `rate` tokens per second. The
/// lock only guards the arithmetic; callers sleep with it released.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    rate: f64,
    level: Mutex<BucketLevel>,
}

impl TokenBucket {
    /// Full bucket of `capacity` tokens refilled at `rate` per second
    pub fn new(capacity: u32, rate: f64) -> Self {
        Self {
            capacity,
            rate,
            level: Mutex::new(BucketLevel {
                tokens: f64::from(capacity),
                refreshed_at: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Tokens in the bucket right now
    pub fn available_tokens(&self) -> f64 {
        let mut level = self.level.lock().unwrap();
        self.top_up(&mut level);
        level.tokens
    }

    /// Time until one token is available; zero when one already is
    pub fn wait_time(&self) -> Duration {
        let mut level = self.level.lock().unwrap();
        self.top_up(&mut level);
        self.deficit_wait(level.tokens)
    }

    /// Takes a token without waiting; false when the bucket is empty
    pub fn try_take(&self) -> bool {
        self.take().is_ok()
    }

    /// Waits for a token and takes it, returning the time spent waiting
    pub async fn acquire(&self) -> Duration {
        let begun = Instant::now();
        while let Err(wait) = self.take() {
            debug!(wait_ms = wait.as_millis() as u64, "Request throttled");
            tokio::time::sleep(wait).await;
        }
        begun.elapsed()
    }

    fn top_up(&self, level: &mut BucketLevel) {
        let now = Instant::now();
        let gained = now.duration_since(level.refreshed_at).as_secs_f64() * self.rate;
        level.tokens = (level.tokens + gained).min(f64::from(self.capacity));
        level.refreshed_at = now;
    }

    fn take(&self) -> Result<(), Duration> {
        let mut level = self.level.lock().unwrap();
        self.top_up(&mut level);
        if level.tokens >= 1.0 {
            level.tokens -= 1.0;
            return Ok(());
        }
        Err(self.deficit_wait(level.tokens))
    }

    /// `(1 - tokens) / rate`, or forever when the bucket never refills
    fn deficit_wait(&self, tokens: f64) -> Duration {
        if tokens >= 1.0 {
            Duration::ZERO
        } else if self.rate > 0.0 {
            Duration::from_secs_f64((1.0 - tokens) / self.rate)
        } else {
            Duration::MAX
        }
    }
}

/// Reads a `Retry-After` value, either delta-seconds or an HTTP-date
///
/// Unparseable values, dates in the past, and dates more than an hour ahead
/// yield `fallback`.
pub fn parse_retry_after(value: &str, fallback: Duration) -> Duration {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Duration::from_secs(secs);
    }
    let until = chrono::DateTime::parse_from_rfc2822(value)
        .ok()
        .and_then(|at| (at.with_timezone(&chrono::Utc) - chrono::Utc::now()).to_std().ok())
        .filter(|d| *d <= MAX_RETRY_AFTER);
    match until {
        Some(wait) => wait,
        None => {
            warn!(value, "Unusable Retry-After header");
            fallback
        }
    }
}
