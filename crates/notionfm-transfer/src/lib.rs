//! notionfm Transfer - Resilient upload engine and downloader
//!
//! Provides:
//! - Part planning for single-shot and multi-part uploads
//! - A per-file upload state machine that survives transient failures and
//!   invalidated sessions
//! - A worker pool that uploads many files concurrently
//! - Resumable downloads of listed files
//!
//! ## Modules
//!
//! - [`planner`] - Turns a local path into a [`FileUploadSpec`](notionfm_core::domain::FileUploadSpec) and [`PartPlan`](notionfm_core::domain::PartPlan)
//! - [`session`] - One file's upload, from session creation to attach
//! - [`orchestrator`] - Shared queue and worker tasks over many sessions
//! - [`download`] - Streams listed files to disk with `Range` resume

pub mod download;
pub mod orchestrator;
pub mod planner;
pub mod session;

use std::path::PathBuf;

use thiserror::Error;

use notionfm_cache::CacheError;
use notionfm_core::domain::DomainError;
use notionfm_core::ports::RemoteError;

/// Rejection of a local file before any request is made
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Missing, not a regular file, empty, or above the size ceiling
    #[error("Invalid file {path}: {reason}")]
    InvalidFile {
        /// Path as given by the caller
        path: PathBuf,
        /// Why the file was rejected
        reason: String,
    },
}

impl PlanError {
    pub(crate) fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<DomainError> for PlanError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidFile { path, reason } => Self::InvalidFile {
                path: path.into(),
                reason,
            },
            other => Self::InvalidFile {
                path: PathBuf::new(),
                reason: other.to_string(),
            },
        }
    }
}

/// Errors that end an upload or download
#[derive(Debug, Error)]
pub enum TransferError {
    /// Local file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Non-retryable remote failure
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The file's size changed after it was planned
    #[error("File {path} changed during upload (planned {expected} bytes, found {actual})")]
    FileChanged {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// A step kept failing transiently past the configured attempt ceiling
    #[error("{step} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Name of the step that gave up
        step: &'static str,
        attempts: u32,
        /// Last error seen
        last: RemoteError,
    },

    /// The session was replaced more often than allowed
    #[error("Gave up after {0} session recoveries")]
    RecoveryLimit(u32),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Stopped before the task was started
    #[error("cancelled")]
    Cancelled,

    /// HTTP failure while downloading
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Download URL answered with an unexpected status
    #[error("Download of {url} returned HTTP {status}")]
    DownloadStatus { status: u16, url: String },

    /// Listing refresh failed
    #[error("Listing error: {0}")]
    Listing(#[from] CacheError),

    /// No listed file has the requested name
    #[error("No file named {0} in the listing")]
    NotFound(String),
}

/// Convenience alias for transfer results
pub type Result<T> = std::result::Result<T, TransferError>;
