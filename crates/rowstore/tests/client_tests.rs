//! HTTP behaviour of the row store client against a mock backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use huddle_config::BackendConfig;
use huddle_rowstore::{ListQuery, RowStore, RowStoreClient, StoreError, Upload};
use serde_json::json;

fn client_for(server: &MockServer) -> RowStoreClient {
    let config = BackendConfig {
        base_url: server.url("/project/"),
        request_timeout_seconds: 5,
        ..BackendConfig::default()
    };
    RowStoreClient::new(&config).expect("client builds")
}

#[tokio::test]
async fn list_sends_filters_and_pagination() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/project/channelMessages/rows")
                .query_param("channel", "c1")
                .query_param("orderBy", "createdAt")
                .query_param("order", "desc")
                .query_param("offset", "10")
                .query_param("limit", "10")
                .header("authorization", "Bearer tok-1");
            then.status(200).json_body(json!({
                "nodes": [{"id": "m1"}, {"id": "m2"}],
                "totalCount": 12
            }));
        })
        .await;

    let client = client_for(&server).with_token(Some("tok-1".to_string()));
    let query = ListQuery::new()
        .filter("channel", "c1")
        .newest_first("createdAt")
        .page(10, 10);
    let page = client.list("channelMessages", &query).await.unwrap();

    mock.assert_async().await;
    assert_eq!(page.len(), 2);
    assert_eq!(page.total_count, Some(12));
}

#[tokio::test]
async fn list_sends_watermark() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/project/channelMessages/rows")
                .query_param("after", "2021-05-06T07:08:09.000Z");
            then.status(200).json_body(json!({"nodes": []}));
        })
        .await;

    let watermark = Utc.with_ymd_and_hms(2021, 5, 6, 7, 8, 9).unwrap();
    let page = client_for(&server)
        .list("channelMessages", &ListQuery::new().after(Some(watermark)))
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(page.is_empty());
}

#[tokio::test]
async fn get_maps_missing_rows_to_none() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/project/channelDefaultView/rows/missing");
            then.status(404).json_body(json!({"message": "not found"}));
        })
        .await;

    let row = client_for(&server)
        .get("channelDefaultView", "missing")
        .await
        .unwrap();
    assert!(row.is_none());
}

#[tokio::test]
async fn insert_posts_fields_and_returns_created_row() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/project/joinedChannels/rows")
                .json_body(json!({"name": "general", "member1": ["m1"], "type": "channel"}));
            then.status(200).json_body(json!({"id": "c9"}));
        })
        .await;

    let created = client_for(&server)
        .insert(
            "joinedChannels",
            json!({"name": "general", "member1": ["m1"], "type": "channel"}),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(created["id"], "c9");
}

#[tokio::test]
async fn insert_without_id_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/project/joinedChannels/rows");
            then.status(200).json_body(json!({"ok": true}));
        })
        .await;

    let result = client_for(&server)
        .insert("joinedChannels", json!({"name": "general"}))
        .await;
    assert!(matches!(result, Err(StoreError::InvalidRow { .. })));
}

#[tokio::test]
async fn api_key_is_attached_when_configured() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/project/memberDefaultView/rows")
                .header("x-api-key", "svc-key");
            then.status(201).json_body(json!({"id": "m7"}));
        })
        .await;

    client_for(&server)
        .with_api_key("svc-key")
        .insert("memberDefaultView", json!({"email": "a@b.co"}))
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn add_relation_posts_to_relations_endpoint() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/project/channelDefaultView/rows/c1/relations")
                .json_body(json!({"member1": ["m2"]}));
            then.status(200).json_body(json!({"ok": true}));
        })
        .await;

    client_for(&server)
        .add_relation("channelDefaultView", "c1", json!({"member1": ["m2"]}))
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn upload_returns_public_url() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/project/messagesDefaultView/upload");
            then.status(200)
                .json_body(json!({"url": "https://cdn.example.com/cat.png"}));
        })
        .await;

    let url = client_for(&server)
        .upload(
            "messagesDefaultView",
            Upload::new("cat.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47]),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(url, "https://cdn.example.com/cat.png");
}

#[tokio::test]
async fn authenticate_returns_token() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/project/authenticate")
                .json_body(json!({"identifier": "ada@example.com", "password": "pw"}));
            then.status(200).json_body(json!({"token": "tok-42"}));
        })
        .await;

    let token = client_for(&server)
        .authenticate("ada@example.com", "pw")
        .await
        .unwrap();
    assert_eq!(token, "tok-42");
}

#[tokio::test]
async fn upstream_errors_carry_status_and_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/project/memberDefaultView/rows");
            then.status(422)
                .json_body(json!({"message": "email already registered"}));
        })
        .await;

    let err = client_for(&server)
        .insert("memberDefaultView", json!({"email": "a@b.co"}))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(422));
    assert!(err.to_string().contains("email already registered"));
}

#[tokio::test]
async fn error_hook_sees_unauthorized_responses() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/project/currentMember/rows");
            then.status(401).json_body(json!({"message": "jwt expired"}));
        })
        .await;

    let unauthorized = Arc::new(AtomicUsize::new(0));
    let seen = unauthorized.clone();
    let client = client_for(&server).with_error_hook(Arc::new(move |err: &StoreError| {
        if err.is_unauthorized() {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    }));

    let result = client.list("currentMember", &ListQuery::new()).await;
    assert!(matches!(result, Err(StoreError::Unauthorized)));
    assert_eq!(unauthorized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn token_can_be_replaced_between_calls() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/project/currentMember/rows")
                .header("authorization", "Bearer fresh");
            then.status(200).json_body(json!({"nodes": [{"id": "m1"}]}));
        })
        .await;

    let client = client_for(&server).with_token(Some("stale".to_string()));
    client.set_token(Some("fresh".to_string()));
    client.list("currentMember", &ListQuery::new()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(client.token().as_deref(), Some("fresh"));
}
