//! notionfm Notion - Notion API client
//!
//! Provides an async, rate-limited client for:
//! - File uploads (single-part and multi-part sessions)
//! - Appending file blocks to pages
//! - Paginated block-children listings
//!
//! ## Modules
//!
//! - [`client`] - HTTP client with token bucket gating and transient retry
//! - [`rate_limit`] - Token bucket and `Retry-After` parsing
//! - [`upload`] - `/file_uploads` endpoints
//! - [`blocks`] - `/blocks/{id}/children` endpoints
//! - [`provider`] - Port implementations backed by the client

pub mod blocks;
pub mod client;
pub mod provider;
pub mod rate_limit;
pub mod upload;

use notionfm_core::ports::RemoteError;
use thiserror::Error;

/// Errors that can occur when communicating with the Notion API
#[derive(Debug, Error)]
pub enum NotionError {
    /// HTTP 400 naming the upload's status: the session no longer accepts parts
    #[error("Upload session invalid: {0}")]
    SessionInvalid(String),

    /// Non-retryable error status
    #[error("API error {status} ({code}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Notion error code, e.g. `validation_error`, `object_not_found`
        code: String,
        /// Message reported by Notion
        message: String,
    },

    /// Transient failures outlived the retry budget
    #[error("Request failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Description of the last failure
        last: String,
    },

    /// A network-level error that is not worth retrying (bad URL, builder error)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<NotionError> for RemoteError {
    fn from(err: NotionError) -> Self {
        match err {
            NotionError::SessionInvalid(msg) => RemoteError::SessionInvalid(msg),
            NotionError::Api {
                status,
                code,
                message,
            } => RemoteError::Api {
                status,
                message: format!("{code}: {message}"),
            },
            NotionError::RetriesExhausted { .. } => RemoteError::Transient(err.to_string()),
            NotionError::Network(e)
                if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() =>
            {
                RemoteError::Transient(e.to_string())
            }
            NotionError::Network(e) => RemoteError::InvalidResponse(e.to_string()),
            NotionError::InvalidResponse(msg) => RemoteError::InvalidResponse(msg),
        }
    }
}
