//! `/file_uploads` endpoints against a mock Notion API

use notionfm_core::domain::UploadId;
use notionfm_notion::upload;
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_create_multi_part_declares_part_count() {
    let (server, client) = common::setup_notion_mock().await;

    Mock::given(method("POST"))
        .and(path("/file_uploads"))
        .and(body_partial_json(json!({
            "mode": "multi_part",
            "number_of_parts": 5,
            "filename": "movie.mkv.txt",
            "content_type": "text/plain"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::file_upload_json("up-1", "pending")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let created = upload::create_file_upload(&client, "movie.mkv.txt", "text/plain", Some(5))
        .await
        .expect("create failed");
    assert_eq!(created.id, "up-1");
    assert_eq!(created.status, "pending");
}

#[tokio::test]
async fn test_create_single_part() {
    let (server, client) = common::setup_notion_mock().await;

    Mock::given(method("POST"))
        .and(path("/file_uploads"))
        .and(body_partial_json(json!({"mode": "single_part", "filename": "a.png"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::file_upload_json("up-2", "pending")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let created = upload::create_file_upload(&client, "a.png", "image/png", None)
        .await
        .unwrap();
    assert_eq!(created.upload_id().unwrap().as_str(), "up-2");
}

#[tokio::test]
async fn test_send_part_is_multipart_with_part_number() {
    let (server, client) = common::setup_notion_mock().await;

    Mock::given(method("POST"))
        .and(path("/file_uploads/up-1/send"))
        .and(body_string_contains("name=\"part_number\""))
        .and(body_string_contains("filename=\"movie.mkv.txt\""))
        .and(body_string_contains("PART-THREE-BYTES"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::file_upload_json("up-1", "pending")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let id = UploadId::new("up-1").unwrap();
    upload::send_file_upload(
        &client,
        &id,
        Some(3),
        "movie.mkv.txt",
        "text/plain",
        b"PART-THREE-BYTES",
    )
    .await
    .expect("send failed");
}

#[tokio::test]
async fn test_send_part_retried_on_503_rebuilds_form() {
    let (server, client) = common::setup_notion_mock().await;

    Mock::given(method("POST"))
        .and(path("/file_uploads/up-1/send"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/file_uploads/up-1/send"))
        .and(body_string_contains("payload"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::file_upload_json("up-1", "uploaded")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let id = UploadId::new("up-1").unwrap();
    upload::send_file_upload(&client, &id, None, "a.txt", "text/plain", b"payload")
        .await
        .expect("send should succeed on retry");
}

#[tokio::test]
async fn test_invalid_mime_rejected_before_request() {
    let (server, client) = common::setup_notion_mock().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let id = UploadId::new("up-1").unwrap();
    let result = upload::send_file_upload(&client, &id, None, "a", "not a mime", b"x").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_complete_and_retrieve() {
    let (server, client) = common::setup_notion_mock().await;

    Mock::given(method("POST"))
        .and(path("/file_uploads/up-1/complete"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::file_upload_json("up-1", "uploaded")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/file_uploads/up-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "up-1",
            "status": "pending",
            "expiry_time": "2099-01-01T00:00:00Z",
            "number_of_parts": {"total": 5, "sent": 3}
        })))
        .mount(&server)
        .await;

    let id = UploadId::new("up-1").unwrap();
    let done = upload::complete_file_upload(&client, &id).await.unwrap();
    assert_eq!(done.status, "uploaded");

    let current = upload::retrieve_file_upload(&client, &id).await.unwrap();
    assert_eq!(current.number_of_parts.unwrap().sent, 3);
}
