//! `NotionRemoteStore` port implementations against a mock Notion API

use notionfm_core::domain::{BlockCategory, PageId, UploadId};
use notionfm_core::ports::{IListingSource, IRemoteStore, RemoteError};
use notionfm_notion::provider::NotionRemoteStore;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_create_session_returns_upload_id() {
    let (server, client) = common::setup_notion_mock().await;
    common::mount_create_upload(&server, "up-9").await;

    let store = NotionRemoteStore::new(client);
    let id = store
        .create_session("a.pdf", "application/pdf", None)
        .await
        .unwrap();
    assert_eq!(id.as_str(), "up-9");
}

#[tokio::test]
async fn test_attach_sends_category_block_with_caption() {
    let (server, client) = common::setup_notion_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/blocks/page-1/children"))
        .and(body_partial_json(json!({
            "children": [{
                "type": "pdf",
                "pdf": {
                    "type": "file_upload",
                    "file_upload": {"id": "up-9"},
                    "caption": [{"text": {"content": "report.pdf"}}]
                }
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let store = NotionRemoteStore::new(client);
    store
        .attach(
            &PageId::new("page-1").unwrap(),
            &UploadId::new("up-9").unwrap(),
            "report.pdf",
            BlockCategory::Document,
        )
        .await
        .expect("attach failed");
}

#[tokio::test]
async fn test_send_part_session_invalid_maps_to_port_error() {
    let (server, client) = common::setup_notion_mock().await;

    Mock::given(method("POST"))
        .and(path("/file_uploads/up-1/send"))
        .respond_with(ResponseTemplate::new(400).set_body_json(common::error_json(
            400,
            "validation_error",
            "File upload is expired and no longer pending.",
        )))
        .mount(&server)
        .await;

    let store = NotionRemoteStore::new(client);
    let err = store
        .send_part(&UploadId::new("up-1").unwrap(), Some(1), "a.txt", "text/plain", b"x")
        .await
        .unwrap_err();
    assert!(err.is_session_invalid(), "{err:?}");
}

#[tokio::test]
async fn test_get_session_status() {
    let (server, client) = common::setup_notion_mock().await;

    Mock::given(method("GET"))
        .and(path("/file_uploads/up-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "up-1",
            "status": "pending",
            "expiry_time": "2099-01-01T00:00:00Z",
            "number_of_parts": {"total": 4, "sent": 2}
        })))
        .mount(&server)
        .await;

    let store = NotionRemoteStore::new(client);
    let status = store
        .get_session_status(&UploadId::new("up-1").unwrap())
        .await
        .unwrap();
    assert!(status.is_usable());
    assert_eq!(status.confirmed_parts, vec![1, 2]);
}

#[tokio::test]
async fn test_expired_session_status_is_not_usable() {
    let (server, client) = common::setup_notion_mock().await;

    Mock::given(method("GET"))
        .and(path("/file_uploads/up-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "up-1",
            "status": "pending",
            "expiry_time": "2001-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;

    let store = NotionRemoteStore::new(client);
    let status = store
        .get_session_status(&UploadId::new("up-1").unwrap())
        .await
        .unwrap();
    assert!(status.expired);
    assert!(!status.is_usable());
}

#[tokio::test]
async fn test_list_children_follows_cursor() {
    let (server, client) = common::setup_notion_mock().await;

    Mock::given(method("GET"))
        .and(path("/blocks/page-1/children"))
        .and(query_param("start_cursor", "cur-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "results": [common::file_block_json("b3", "c.zip", "https://s3.example/c.zip.txt")],
            "has_more": false,
            "next_cursor": null
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blocks/page-1/children"))
        .and(query_param("page_size", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "results": [
                common::file_block_json("b1", "a.iso", "https://s3.example/a.iso.txt"),
                common::paragraph_block_json("b2")
            ],
            "has_more": true,
            "next_cursor": "cur-2"
        })))
        .mount(&server)
        .await;

    let store = NotionRemoteStore::new(client).with_page_size(2);
    let page = PageId::new("page-1").unwrap();

    let first = store.list_children(&page, None).await.unwrap();
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.next_cursor.as_deref(), Some("cur-2"));
    assert_eq!(first.items[0].display_name(), "a.iso");
    assert!(!first.items[1].is_file());

    let second = store.list_children(&page, Some("cur-2")).await.unwrap();
    assert_eq!(second.items.len(), 1);
    assert!(second.next_cursor.is_none());
}

#[tokio::test]
async fn test_listing_not_found_is_api_error() {
    let (server, client) = common::setup_notion_mock().await;

    Mock::given(method("GET"))
        .and(path("/blocks/gone/children"))
        .respond_with(ResponseTemplate::new(404).set_body_json(common::error_json(
            404,
            "object_not_found",
            "Could not find block",
        )))
        .mount(&server)
        .await;

    let store = NotionRemoteStore::new(client);
    let err = store
        .list_children(&PageId::new("gone").unwrap(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Api { status: 404, .. }));
}
