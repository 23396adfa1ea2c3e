//! Block operations for the Notion API
//!
//! - [`append_file_block`] attaches a finished upload to a page
//! - [`list_children`] fetches one page of a block's children
//!
//! Children listings are paginated: each response carries `has_more` and
//! `next_cursor`, which is passed back as `start_cursor`.

use notionfm_core::domain::{BlockCategory, PageId, UploadId};
use notionfm_core::ports::{ListingItem, ListingPage};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::client::NotionClient;
use crate::NotionError;

/// Largest `page_size` Notion accepts
pub const MAX_PAGE_SIZE: u32 = 100;

// ============================================================================
// Response types
// ============================================================================

/// Paginated list response
#[derive(Debug, Deserialize)]
struct ChildrenResponse {
    results: Vec<RawBlock>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

/// A block whose content lives under a key named after its type
#[derive(Debug, Deserialize)]
struct RawBlock {
    id: String,
    #[serde(rename = "type")]
    block_type: String,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Joins the plain text of a rich text array
fn rich_text_plain(value: Option<&Value>) -> Option<String> {
    let items = value?.as_array()?;
    let text: String = items
        .iter()
        .filter_map(|item| {
            item.get("plain_text")
                .or_else(|| item.get("text").and_then(|t| t.get("content")))
                .and_then(Value::as_str)
        })
        .collect();
    (!text.is_empty()).then_some(text)
}

impl From<RawBlock> for ListingItem {
    fn from(block: RawBlock) -> Self {
        let content = block.rest.get(&block.block_type);
        let field = |key: &str| content.and_then(|c| c.get(key));

        let caption = rich_text_plain(field("caption"));
        let name = field("name").and_then(Value::as_str).map(str::to_string);
        let url = ["file", "external"]
            .iter()
            .find_map(|kind| field(kind).and_then(|f| f.get("url")).and_then(Value::as_str))
            .map(str::to_string);

        ListingItem {
            id: block.id,
            block_type: block.block_type,
            caption,
            name,
            url,
        }
    }
}

// ============================================================================
// Endpoints
// ============================================================================

/// Builds the `children` payload for a file-bearing block
fn file_block_body(upload_id: &UploadId, display_name: &str, category: BlockCategory) -> Value {
    let block_type = category.block_type();
    json!({
        "children": [{
            "object": "block",
            "type": block_type,
            block_type: {
                "type": "file_upload",
                "file_upload": { "id": upload_id.as_str() },
                "caption": [{ "type": "text", "text": { "content": display_name } }],
            },
        }]
    })
}

/// Appends a block referencing `upload_id` to `page`
///
/// The block type follows `category`; `display_name` becomes the caption so
/// the original file name survives spoofing.
pub async fn append_file_block(
    client: &NotionClient,
    page: &PageId,
    upload_id: &UploadId,
    display_name: &str,
    category: BlockCategory,
) -> Result<(), NotionError> {
    let path = format!("/blocks/{}/children", page.as_str());
    let body = file_block_body(upload_id, display_name, category);
    debug!(page = %page, id = %upload_id, %category, "Appending file block");

    client
        .send("append file block", || {
            client.request(Method::PATCH, &path).json(&body)
        })
        .await?;
    Ok(())
}

/// Fetches one page of the children of `block_id`
pub async fn list_children(
    client: &NotionClient,
    block_id: &PageId,
    cursor: Option<&str>,
    page_size: u32,
) -> Result<ListingPage, NotionError> {
    let path = format!("/blocks/{}/children", block_id.as_str());
    let mut query = vec![("page_size", page_size.clamp(1, MAX_PAGE_SIZE).to_string())];
    if let Some(cursor) = cursor {
        query.push(("start_cursor", cursor.to_string()));
    }

    let response: ChildrenResponse = client
        .send_json("list block children", || {
            client.request(Method::GET, &path).query(&query)
        })
        .await?;

    let next_cursor = if response.has_more {
        response.next_cursor
    } else {
        None
    };
    debug!(
        block = %block_id,
        count = response.results.len(),
        has_more = next_cursor.is_some(),
        "Fetched block children"
    );

    Ok(ListingPage {
        items: response.results.into_iter().map(ListingItem::from).collect(),
        next_cursor,
    })
}
