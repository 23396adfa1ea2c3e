//! Remote store port (driven/secondary port)
//!
//! The interface the upload session drives. It mirrors the remote's
//! session-based upload API: create a session, send parts, complete the
//! session, and attach the result to a destination page.
//!
//! ## Design Notes
//!
//! - Errors are classified into [`RemoteError`] at the port boundary because
//!   the upload state machine branches on the category (retry, recover, fail).
//! - Uses `#[async_trait]` for async trait methods.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::newtypes::{PageId, UploadId};
use crate::domain::upload::BlockCategory;

// ============================================================================
// RemoteError
// ============================================================================

/// Classified failure of a remote call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Connection failure, timeout, 429 or 5xx that outlived the client's own retries
    #[error("Transient remote failure: {0}")]
    Transient(String),

    /// The upload session is no longer accepted by the remote
    #[error("Upload session invalid: {0}")]
    SessionInvalid(String),

    /// Non-retryable API error
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Message reported by the remote
        message: String,
    },

    /// The remote answered with something that could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Returns true if repeating the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }

    pub fn is_session_invalid(&self) -> bool {
        matches!(self, RemoteError::SessionInvalid(_))
    }
}

// ============================================================================
// RemoteSessionStatus
// ============================================================================

/// State of an upload session as reported by the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSessionStatus {
    /// Raw status string, e.g. `pending`, `uploaded`, `expired`, `failed`
    pub status: String,
    /// Part numbers the remote reports as received, when it reports them
    pub confirmed_parts: Vec<u32>,
    /// Whether the session's expiry time has passed
    pub expired: bool,
}

impl RemoteSessionStatus {
    /// A session can take more parts while it is pending and unexpired.
    pub fn is_usable(&self) -> bool {
        self.status.eq_ignore_ascii_case("pending") && !self.expired
    }
}

// ============================================================================
// IRemoteStore trait
// ============================================================================

/// Remote upload API
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Creates an upload session
    ///
    /// `part_count` is `None` for a single-shot upload and the declared
    /// number of parts for a multi-part upload.
    async fn create_session(
        &self,
        filename: &str,
        content_type: &str,
        part_count: Option<u32>,
    ) -> Result<UploadId, RemoteError>;

    /// Sends one part (or the whole payload when `part_number` is `None`)
    ///
    /// Re-sending a part number already sent is accepted by the remote.
    async fn send_part(
        &self,
        upload_id: &UploadId,
        part_number: Option<u32>,
        filename: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<(), RemoteError>;

    /// Asks the remote to assemble a multi-part upload
    async fn complete_session(&self, upload_id: &UploadId) -> Result<(), RemoteError>;

    /// Binds a finished upload to `destination` as a block of `category`
    ///
    /// `display_name` is the original file name and is shown as the caption.
    async fn attach(
        &self,
        destination: &PageId,
        upload_id: &UploadId,
        display_name: &str,
        category: BlockCategory,
    ) -> Result<(), RemoteError>;

    /// Reports whether a session is still usable
    async fn get_session_status(
        &self,
        upload_id: &UploadId,
    ) -> Result<RemoteSessionStatus, RemoteError>;
}
