//! Upload planning types
//!
//! [`FileUploadSpec`] describes *what* is uploaded (names, MIME type, block
//! category) and [`PartPlan`] describes *how* the bytes are split. Both are
//! computed once per file and never mutated.

use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Extensions the remote accepts as-is. Anything else is sent as plain text.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    // audio
    "aac", "adts", "mid", "midi", "mp3", "mpga", "m4a", "m4b", "oga", "ogg", "wav", "wma",
    // video
    "amv", "asf", "wmv", "avi", "f4v", "flv", "gifv", "m4v", "mp4", "mkv", "webm", "mov", "qt",
    "mpeg",
    // image
    "gif", "heic", "jpeg", "jpg", "png", "svg", "tif", "tiff", "webp", "ico",
    // documents
    "pdf", "txt", "json", "doc", "dot", "docx", "dotx", "xls", "xlt", "xla", "xlsx", "xltx",
    "ppt", "pot", "pps", "ppa", "pptx", "potx",
];

/// Suffix appended to the upload name of a spoofed file.
pub const SPOOF_SUFFIX: &str = ".txt";

/// MIME type sent for spoofed files.
pub const SPOOF_MIME: &str = "text/plain";

const FALLBACK_MIME: &str = "application/octet-stream";

// ============================================================================
// BlockCategory
// ============================================================================

/// Kind of block created when an upload is attached to a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCategory {
    Image,
    Video,
    Audio,
    /// PDF document, rendered inline by the remote
    Document,
    /// Any other file
    Generic,
}

impl BlockCategory {
    /// Infer the category from a MIME type.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime == "application/pdf" {
            Self::Document
        } else if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("audio/") {
            Self::Audio
        } else {
            Self::Generic
        }
    }

    /// Block `type` string used by the remote API.
    pub fn block_type(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "pdf",
            Self::Generic => "file",
        }
    }
}

impl std::fmt::Display for BlockCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.block_type())
    }
}

// ============================================================================
// FileUploadSpec
// ============================================================================

/// Immutable description of one file to upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadSpec {
    path: PathBuf,
    original_name: String,
    upload_name: String,
    size: u64,
    content_type: String,
    category: BlockCategory,
    spoofed: bool,
}

/// Returns true if `name` has an extension the remote accepts as-is.
pub fn is_allowed_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

impl FileUploadSpec {
    /// Derive the spec for `path` with a known `size`.
    ///
    /// Does not touch the filesystem; size checks belong to the planner.
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Result<Self, DomainError> {
        let path = path.into();
        let original_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                DomainError::invalid_file(path.display().to_string(), "no usable file name")
            })?;

        let spoofed = !is_allowed_extension(&original_name);
        let (upload_name, content_type) = if spoofed {
            (format!("{original_name}{SPOOF_SUFFIX}"), SPOOF_MIME.to_string())
        } else {
            let mime = mime_guess::from_path(&original_name)
                .first_raw()
                .unwrap_or(FALLBACK_MIME)
                .to_string();
            (original_name.clone(), mime)
        };
        let category = BlockCategory::from_mime(&content_type);

        Ok(Self {
            path,
            original_name,
            upload_name,
            size,
            content_type,
            category,
            spoofed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the file on the local disk; used as the caption on attach.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Name sent to the remote, with [`SPOOF_SUFFIX`] when spoofed.
    pub fn upload_name(&self) -> &str {
        &self.upload_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn category(&self) -> BlockCategory {
        self.category
    }

    pub fn is_spoofed(&self) -> bool {
        self.spoofed
    }
}

// ============================================================================
// PartPlan
// ============================================================================

/// Size limits that drive part planning, all in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartLimits {
    /// Files at or below this size are sent in one request
    pub single_part_threshold: u64,
    /// Lower bound for the size of one part
    pub min_part_size: u64,
    /// Provider ceiling on the number of parts
    pub max_parts: u32,
    /// Absolute upper bound on file size
    pub max_file_size: u64,
}

impl Default for PartLimits {
    fn default() -> Self {
        const MIB: u64 = 1024 * 1024;
        Self {
            single_part_threshold: 20 * MIB,
            min_part_size: 10 * MIB,
            max_parts: 990,
            max_file_size: 5 * 1024 * MIB,
        }
    }
}

/// How a file is split into parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    total_size: u64,
    part_size: u64,
    part_count: u32,
    multipart: bool,
}

impl PartPlan {
    /// Compute the plan for a file of `size` bytes.
    ///
    /// Size bounds (empty, too large) are checked by the caller; this only
    /// guards against a zero-sized part.
    pub fn compute(size: u64, limits: &PartLimits) -> Self {
        if size <= limits.single_part_threshold {
            return Self {
                total_size: size,
                part_size: size,
                part_count: 1,
                multipart: false,
            };
        }

        let max_parts = u64::from(limits.max_parts.max(1));
        let part_size = limits.min_part_size.max(size.div_ceil(max_parts)).max(1);
        let part_count = size.div_ceil(part_size);

        Self {
            total_size: size,
            part_size,
            part_count: part_count as u32,
            multipart: true,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Size of every part except possibly the last.
    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    pub fn part_count(&self) -> u32 {
        self.part_count
    }

    /// False for single-shot uploads.
    pub fn is_multipart(&self) -> bool {
        self.multipart
    }

    /// Byte range of 1-based part `part`.
    pub fn part_range(&self, part: u32) -> Result<Range<u64>, DomainError> {
        if part == 0 || part > self.part_count {
            return Err(DomainError::PartOutOfRange {
                part,
                count: self.part_count,
            });
        }
        let start = u64::from(part - 1) * self.part_size;
        let end = (start + self.part_size).min(self.total_size);
        Ok(start..end)
    }

    /// Length in bytes of 1-based part `part`.
    pub fn part_len(&self, part: u32) -> Result<u64, DomainError> {
        self.part_range(part).map(|r| r.end - r.start)
    }
}
