//! Notion API client
//!
//! Wraps `reqwest::Client` with the authentication and version headers,
//! a shared [`TokenBucket`] that gates every attempt, and bounded retry of
//! transient failures.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use reqwest::Method;
//! use notionfm_notion::client::NotionClient;
//!
//! # async fn example() -> Result<(), notionfm_notion::NotionError> {
//! let client = NotionClient::new("secret_token")?;
//! let response = client
//!     .send("retrieve page", || client.request(Method::GET, "/pages/abc"))
//!     .await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use notionfm_core::config::{ApiConfig, RateLimitingConfig};
use notionfm_core::domain::RetryPolicy;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::rate_limit::{parse_retry_after, TokenBucket};
use crate::NotionError;

/// Base URL for the Notion REST API
const NOTION_BASE_URL: &str = "https://api.notion.com/v1";

/// Value of the `Notion-Version` header
pub const NOTION_VERSION: &str = "2022-06-28";

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Notion error body
// ============================================================================

/// Error object returned by Notion on non-success statuses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Outcome of inspecting one response or transport error
enum Attempt {
    Done(Response),
    Retry { delay: Duration, reason: String },
    Fail(NotionError),
}

// ============================================================================
// NotionClient
// ============================================================================

/// HTTP client for Notion API calls
///
/// Every attempt (first try or retry) first takes one token from the shared
/// bucket. Connection errors, timeouts, 429 and 500/502/503/504 are retried
/// with capped exponential backoff; a 429 waits for the larger of
/// `Retry-After` and `rate_limit_delay * (attempt + 1)`.
#[derive(Debug, Clone)]
pub struct NotionClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
    /// Integration token
    token: String,
    /// `Notion-Version` header value
    notion_version: String,
    /// Shared limiter
    bucket: Arc<TokenBucket>,
    /// Transient retry policy (bounded)
    retry: RetryPolicy,
    /// Base wait after a 429
    rate_limit_delay: Duration,
}

impl NotionClient {
    /// Creates a client against the public API with default limits
    pub fn new(token: impl Into<String>) -> Result<Self, NotionError> {
        Self::with_base_url(token, NOTION_BASE_URL)
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, NotionError> {
        let limits = RateLimitingConfig::default();
        Ok(Self {
            client: Client::builder().timeout(DEFAULT_TIMEOUT).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            notion_version: NOTION_VERSION.to_string(),
            bucket: Arc::new(TokenBucket::new(limits.burst, limits.requests_per_second)),
            retry: limits.retry_policy(),
            rate_limit_delay: limits.rate_limit_delay(),
        })
    }

    /// Creates a client from the `api` and `rate_limiting` config sections
    pub fn from_config(
        token: impl Into<String>,
        api: &ApiConfig,
        limits: &RateLimitingConfig,
    ) -> Result<Self, NotionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            notion_version: api.notion_version.clone(),
            bucket: Arc::new(TokenBucket::new(limits.burst, limits.requests_per_second)),
            retry: limits.retry_policy(),
            rate_limit_delay: limits.rate_limit_delay(),
        })
    }

    /// Shares `bucket` with this client instead of its own
    pub fn with_token_bucket(mut self, bucket: Arc<TokenBucket>) -> Self {
        self.bucket = bucket;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    pub fn token_bucket(&self) -> &Arc<TokenBucket> {
        &self.bucket
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for the given method and path
    ///
    /// Prepends the base URL and adds the `Authorization` and
    /// `Notion-Version` headers.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, &url)
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.notion_version)
    }

    /// Sends a request built by `build`, gating and retrying each attempt
    ///
    /// `build` is called once per attempt because multipart bodies cannot
    /// be cloned. `operation` labels log lines.
    pub async fn send<F>(&self, operation: &str, build: F) -> Result<Response, NotionError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.dispatch(operation, &build, 0)
            .await
            .map(|(response, _)| response)
    }

    /// Sends and deserializes a JSON response body
    ///
    /// A body cut off mid-read is retried from the request on the same
    /// attempt budget as `send`. A complete body that is not the expected
    /// JSON is a [`NotionError::InvalidResponse`].
    pub async fn send_json<T, F>(&self, operation: &str, build: F) -> Result<T, NotionError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            let (response, used) = self.dispatch(operation, &build, attempt).await?;
            let err = match response.bytes().await {
                Ok(body) => {
                    return serde_json::from_slice(&body)
                        .map_err(|e| NotionError::InvalidResponse(format!("{operation}: {e}")));
                }
                Err(err) => err,
            };

            let reason = format!("response body: {err}");
            attempt = used + 1;
            if !self.retry.should_retry(attempt) {
                warn!(operation, attempts = attempt, last = %reason, "Retry limit exhausted");
                return Err(NotionError::RetriesExhausted {
                    attempts: attempt,
                    last: reason,
                });
            }
            let delay = self.retry.delay_for(used);
            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Response body interrupted, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Runs attempts from `first_attempt` until a response arrives
    ///
    /// Returns the response with the index of the attempt that produced it.
    async fn dispatch<F>(
        &self,
        operation: &str,
        build: &F,
        first_attempt: u32,
    ) -> Result<(Response, u32), NotionError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = first_attempt;
        loop {
            self.bucket.acquire().await;
            debug!(operation, attempt, "Sending request");

            let outcome = match build().send().await {
                Ok(response) => self.inspect_response(response, attempt).await,
                Err(err) => Self::inspect_transport_error(err, &self.retry, attempt),
            };

            let (delay, reason) = match outcome {
                Attempt::Done(response) => {
                    if attempt > 0 {
                        info!(operation, attempt, "Request succeeded after retry");
                    }
                    return Ok((response, attempt));
                }
                Attempt::Fail(err) => return Err(err),
                Attempt::Retry { delay, reason } => (delay, reason),
            };

            attempt += 1;
            if !self.retry.should_retry(attempt) {
                warn!(operation, attempts = attempt, last = %reason, "Retry limit exhausted");
                return Err(NotionError::RetriesExhausted {
                    attempts: attempt,
                    last: reason,
                });
            }

            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn inspect_response(&self, response: Response, attempt: u32) -> Attempt {
        let status = response.status();
        if status.is_success() {
            return Attempt::Done(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let floor = self.rate_limit_delay.saturating_mul(attempt + 1);
            let delay = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .map(|v| parse_retry_after(v, floor))
                .unwrap_or(floor)
                .max(floor);
            return Attempt::Retry {
                delay,
                reason: "HTTP 429 Too Many Requests".to_string(),
            };
        }

        if matches!(
            status,
            StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Attempt::Retry {
                delay: self.retry.delay_for(attempt),
                reason: format!("HTTP {}", status.as_u16()),
            };
        }

        let text = response.text().await.unwrap_or_default();
        Attempt::Fail(classify_error_body(status, &text))
    }

    fn inspect_transport_error(err: reqwest::Error, retry: &RetryPolicy, attempt: u32) -> Attempt {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            let kind = if err.is_timeout() { "timeout" } else { "connection error" };
            Attempt::Retry {
                delay: retry.delay_for(attempt),
                reason: format!("{kind}: {err}"),
            }
        } else {
            Attempt::Fail(NotionError::Network(err))
        }
    }
}

/// Maps a non-retryable status and its body to a [`NotionError`]
///
/// A 400 whose message mentions `status` or `pending` means the upload
/// session is no longer in a state that accepts the call. Only the message
/// is searched; every Notion error object carries a `status` key.
pub(crate) fn classify_error_body(status: StatusCode, body: &str) -> NotionError {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let (code, message) = match parsed {
        Some(b) => (
            b.code.unwrap_or_else(|| "unknown".to_string()),
            b.message.unwrap_or_default(),
        ),
        None => ("unknown".to_string(), body.to_string()),
    };

    if status == StatusCode::BAD_REQUEST {
        let lower = message.to_ascii_lowercase();
        if lower.contains("status") || lower.contains("pending") {
            return NotionError::SessionInvalid(message);
        }
    }

    NotionError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}
