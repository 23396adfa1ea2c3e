//! Chunk planner
//!
//! Checks a local file against the size limits and decides how it is
//! uploaded. Nothing here talks to the network.

use std::path::Path;

use tracing::debug;

use notionfm_core::domain::{FileUploadSpec, PartLimits, PartPlan};

use crate::PlanError;

/// Plans uploads against a fixed set of [`PartLimits`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkPlanner {
    limits: PartLimits,
}

impl ChunkPlanner {
    pub fn new(limits: PartLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &PartLimits {
        &self.limits
    }

    /// Reads the size of `path` and returns its upload spec and part plan
    ///
    /// # Errors
    ///
    /// [`PlanError::InvalidFile`] when the path is missing, is not a regular
    /// file, is empty, or exceeds the maximum file size.
    pub async fn plan(&self, path: &Path) -> Result<(FileUploadSpec, PartPlan), PlanError> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlanError::invalid(path, "file does not exist")
            } else {
                PlanError::invalid(path, e.to_string())
            }
        })?;

        if !metadata.is_file() {
            return Err(PlanError::invalid(path, "not a regular file"));
        }

        let size = metadata.len();
        if size == 0 {
            return Err(PlanError::invalid(path, "file is empty"));
        }
        if size > self.limits.max_file_size {
            return Err(PlanError::invalid(
                path,
                format!(
                    "{size} bytes exceeds the maximum of {} bytes",
                    self.limits.max_file_size
                ),
            ));
        }

        let spec = FileUploadSpec::new(path, size)?;
        let plan = PartPlan::compute(size, &self.limits);

        debug!(
            path = %path.display(),
            size,
            parts = plan.part_count(),
            part_size = plan.part_size(),
            spoofed = spec.is_spoofed(),
            "Planned upload"
        );
        Ok((spec, plan))
    }
}
