//! File upload operations for the Notion API
//!
//! Provides functions for the `/file_uploads` endpoints:
//! - [`create_file_upload`] - Creates a single-part or multi-part upload
//! - [`send_file_upload`] - Sends the payload or one numbered part
//! - [`complete_file_upload`] - Assembles a multi-part upload
//! - [`retrieve_file_upload`] - Reads an upload's status and expiry
//!
//! ## Notion API References
//!
//! - [Create a file upload](https://developers.notion.com/reference/create-a-file-upload)
//! - [Send a file upload](https://developers.notion.com/reference/send-a-file-upload)
//! - [Complete a file upload](https://developers.notion.com/reference/complete-a-file-upload)

use chrono::{DateTime, Utc};
use notionfm_core::domain::UploadId;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::client::NotionClient;
use crate::NotionError;

// ============================================================================
// Response types
// ============================================================================

/// File upload object returned by every `/file_uploads` endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileUpload {
    /// Upload identifier
    pub id: String,
    /// `pending`, `uploaded`, `expired` or `failed`
    pub status: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    /// When a pending upload stops accepting parts
    pub expiry_time: Option<DateTime<Utc>>,
    /// Present for multi-part uploads
    pub number_of_parts: Option<PartCounts>,
}

/// Declared and received part counts of a multi-part upload
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct PartCounts {
    pub total: u32,
    pub sent: u32,
}

impl FileUpload {
    /// Returns true once the expiry time has passed or the status says so
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status.eq_ignore_ascii_case("expired")
            || self.expiry_time.map(|t| t <= now).unwrap_or(false)
    }

    pub fn upload_id(&self) -> Result<UploadId, NotionError> {
        UploadId::new(self.id.clone())
            .map_err(|e| NotionError::InvalidResponse(format!("file upload id: {e}")))
    }
}

/// Builds the JSON body of `POST /file_uploads`
fn create_body(filename: &str, content_type: &str, part_count: Option<u32>) -> serde_json::Value {
    match part_count {
        Some(parts) => json!({
            "mode": "multi_part",
            "number_of_parts": parts,
            "filename": filename,
            "content_type": content_type,
        }),
        None => json!({
            "mode": "single_part",
            "filename": filename,
            "content_type": content_type,
        }),
    }
}

// ============================================================================
// Endpoints
// ============================================================================

/// Creates a file upload
///
/// `part_count` is `None` for a single-part upload; otherwise the upload is
/// created in `multi_part` mode declaring that many parts.
pub async fn create_file_upload(
    client: &NotionClient,
    filename: &str,
    content_type: &str,
    part_count: Option<u32>,
) -> Result<FileUpload, NotionError> {
    let body = create_body(filename, content_type, part_count);
    debug!(filename, ?part_count, "Creating file upload");

    let upload: FileUpload = client
        .send_json("create file upload", || {
            client.request(Method::POST, "/file_uploads").json(&body)
        })
        .await?;

    debug!(id = %upload.id, status = %upload.status, "File upload created");
    Ok(upload)
}

/// Sends the whole payload (`part_number == None`) or one 1-based part
///
/// The body is a multipart form with a `file` field and, for multi-part
/// uploads, a `part_number` field.
pub async fn send_file_upload(
    client: &NotionClient,
    upload_id: &UploadId,
    part_number: Option<u32>,
    filename: &str,
    content_type: &str,
    data: &[u8],
) -> Result<(), NotionError> {
    // Reject an unparseable MIME type once, before any attempt
    Part::bytes(Vec::new()).mime_str(content_type)?;

    let path = format!("/file_uploads/{}/send", upload_id.as_str());
    debug!(
        id = %upload_id,
        ?part_number,
        bytes = data.len(),
        "Sending file upload data"
    );

    let build_form = || {
        let part = Part::bytes(data.to_vec()).file_name(filename.to_string());
        let part = match part.mime_str(content_type) {
            Ok(part) => part,
            Err(_) => Part::bytes(data.to_vec()).file_name(filename.to_string()),
        };
        let form = Form::new().part("file", part);
        match part_number {
            Some(n) => form.text("part_number", n.to_string()),
            None => form,
        }
    };

    // The returned object is not needed; a 2xx status is the acknowledgement
    client
        .send("send file upload", || {
            client.request(Method::POST, &path).multipart(build_form())
        })
        .await?;
    Ok(())
}

/// Completes a multi-part upload
pub async fn complete_file_upload(
    client: &NotionClient,
    upload_id: &UploadId,
) -> Result<FileUpload, NotionError> {
    let path = format!("/file_uploads/{}/complete", upload_id.as_str());
    debug!(id = %upload_id, "Completing file upload");

    client
        .send_json("complete file upload", || {
            client.request(Method::POST, &path).json(&json!({}))
        })
        .await
}

/// Retrieves a file upload
pub async fn retrieve_file_upload(
    client: &NotionClient,
    upload_id: &UploadId,
) -> Result<FileUpload, NotionError> {
    let path = format!("/file_uploads/{}", upload_id.as_str());
    client
        .send_json("retrieve file upload", || client.request(Method::GET, &path))
        .await
}
