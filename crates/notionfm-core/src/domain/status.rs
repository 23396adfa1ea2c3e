//! Task status and progress events
//!
//! [`TaskStatus`] is the lifecycle phase of one file upload; [`UploadProgress`]
//! is the fixed event handed to progress callbacks.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Lifecycle phase of one upload task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, no request made yet
    #[default]
    Pending,
    /// Creating the session or sending parts
    Uploading,
    /// Asking the remote to assemble the parts
    Completing,
    /// Binding the finished upload to its destination page
    Attaching,
    /// Upload attached to the destination
    Completed,
    /// Gave up on a non-retryable error
    Failed,
    /// Waiting out a backoff delay before repeating a step
    Retrying,
    /// Asking the remote whether a suspect session is still usable
    CheckingSession,
    /// Replacing an invalidated session
    RecoveringSession,
}

impl TaskStatus {
    /// Returns true for `Completed` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Returns true while a worker is actively moving bytes or calling the remote
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != TaskStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    /// Terminal states accept no further transitions; all others move freely.
    pub fn can_transition_to(&self, _next: TaskStatus) -> bool {
        !self.is_terminal()
    }

    /// Validated transition, returning the new state.
    pub fn transition_to(self, next: TaskStatus) -> Result<TaskStatus, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidState {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Uploading => "uploading",
            TaskStatus::Completing => "completing",
            TaskStatus::Attaching => "attaching",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Retrying => "retrying",
            TaskStatus::CheckingSession => "checking_session",
            TaskStatus::RecoveringSession => "recovering_session",
        };
        f.write_str(s)
    }
}

/// Progress event emitted on every phase and part transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    /// Original file name
    pub file_name: String,
    /// Bytes confirmed by the remote so far
    pub bytes_confirmed: u64,
    pub total_bytes: u64,
    pub status: TaskStatus,
    /// 1-based part currently in flight (0 before the first part)
    pub part_current: u32,
    pub part_total: u32,
    /// Retries performed so far for this file
    pub retry_count: u32,
}

impl UploadProgress {
    pub fn new(file_name: impl Into<String>, total_bytes: u64, part_total: u32) -> Self {
        Self {
            file_name: file_name.into(),
            bytes_confirmed: 0,
            total_bytes,
            status: TaskStatus::Pending,
            part_current: 0,
            part_total,
            retry_count: 0,
        }
    }

    /// Completion ratio in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.status.is_success() { 1.0 } else { 0.0 };
        }
        (self.bytes_confirmed as f64 / self.total_bytes as f64).min(1.0)
    }
}
