//! NotionRemoteStore - port implementations backed by the Notion API
//!
//! Wraps a [`NotionClient`] and delegates to the [`upload`] and [`blocks`]
//! modules to fulfil the [`IRemoteStore`] and [`IListingSource`] contracts.
//! Adapter errors are classified into [`RemoteError`] here.

use chrono::Utc;
use tracing::debug;

use notionfm_core::domain::{BlockCategory, PageId, UploadId};
use notionfm_core::ports::{
    IListingSource, IRemoteStore, ListingPage, RemoteError, RemoteSessionStatus,
};

use crate::blocks;
use crate::client::NotionClient;
use crate::upload;

/// Default number of blocks requested per listing page
const DEFAULT_PAGE_SIZE: u32 = 25;

/// Remote store and listing source backed by the Notion API
#[derive(Debug, Clone)]
pub struct NotionRemoteStore {
    client: NotionClient,
    page_size: u32,
}

impl NotionRemoteStore {
    pub fn new(client: NotionClient) -> Self {
        Self {
            client,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the listing page size (clamped to Notion's maximum on use)
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn client(&self) -> &NotionClient {
        &self.client
    }
}

#[async_trait::async_trait]
impl IRemoteStore for NotionRemoteStore {
    async fn create_session(
        &self,
        filename: &str,
        content_type: &str,
        part_count: Option<u32>,
    ) -> Result<UploadId, RemoteError> {
        let upload =
            upload::create_file_upload(&self.client, filename, content_type, part_count).await?;
        Ok(upload.upload_id()?)
    }

    async fn send_part(
        &self,
        upload_id: &UploadId,
        part_number: Option<u32>,
        filename: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<(), RemoteError> {
        upload::send_file_upload(
            &self.client,
            upload_id,
            part_number,
            filename,
            content_type,
            data,
        )
        .await?;
        Ok(())
    }

    async fn complete_session(&self, upload_id: &UploadId) -> Result<(), RemoteError> {
        upload::complete_file_upload(&self.client, upload_id).await?;
        Ok(())
    }

    async fn attach(
        &self,
        destination: &PageId,
        upload_id: &UploadId,
        display_name: &str,
        category: BlockCategory,
    ) -> Result<(), RemoteError> {
        blocks::append_file_block(&self.client, destination, upload_id, display_name, category)
            .await?;
        Ok(())
    }

    /// Notion reports only how many parts were received, so
    /// `confirmed_parts` lists `1..=sent`.
    async fn get_session_status(
        &self,
        upload_id: &UploadId,
    ) -> Result<RemoteSessionStatus, RemoteError> {
        let upload = upload::retrieve_file_upload(&self.client, upload_id).await?;
        let sent = upload.number_of_parts.map(|p| p.sent).unwrap_or(0);
        let status = RemoteSessionStatus {
            expired: upload.is_expired(Utc::now()),
            confirmed_parts: (1..=sent).collect(),
            status: upload.status,
        };
        debug!(id = %upload_id, status = %status.status, sent, expired = status.expired, "Retrieved upload status");
        Ok(status)
    }
}

#[async_trait::async_trait]
impl IListingSource for NotionRemoteStore {
    async fn list_children(
        &self,
        container: &PageId,
        cursor: Option<&str>,
    ) -> Result<ListingPage, RemoteError> {
        Ok(blocks::list_children(&self.client, container, cursor, self.page_size).await?)
    }
}
