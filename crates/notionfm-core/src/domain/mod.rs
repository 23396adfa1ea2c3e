//! Domain entities and business logic
//!
//! This module contains the core domain types for notionfm:
//! - Newtypes for remote identifiers (upload sessions, pages)
//! - Upload planning types (file spec, part plan, block category)
//! - Task status and progress events
//! - Retry policy used by every network step
//! - Domain-specific error types

pub mod errors;
pub mod newtypes;
pub mod retry;
pub mod status;
pub mod upload;

// Re-export commonly used types
pub use errors::DomainError;
pub use newtypes::{PageId, UploadId};
pub use retry::{RetryDecision, RetryPolicy};
pub use status::{TaskStatus, UploadProgress};
pub use upload::{BlockCategory, FileUploadSpec, PartLimits, PartPlan};
