//! `GatewayClient` against a wiremock gateway.

use futures::StreamExt;
use medlake_collector::{ChannelEntity, ChannelSource, GatewayClient, SourceError};
use medlake_core::ChannelName;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GatewayClient {
    GatewayClient::new(&server.uri(), Some("secret"), 5, "medlake-test/0.1").unwrap()
}

fn entity(name: &str) -> ChannelEntity {
    ChannelEntity {
        id: 42,
        name: ChannelName::parse(name).unwrap(),
        title: "Demo".to_owned(),
    }
}

fn raw_message(id: i64) -> serde_json::Value {
    json!({
        "id": id,
        "date": "2024-01-01T09:00:00Z",
        "text": format!("message {id}"),
        "has_media": false,
        "views": 5,
        "forwards": 1
    })
}

// ---------------------------------------------------------------------------
// resolve
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resolve_returns_entity_and_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/demo"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42, "title": "Demo"})))
        .expect(1)
        .mount(&server)
        .await;

    let resolved = client(&server)
        .resolve(&ChannelName::parse("@demo").unwrap())
        .await
        .unwrap();

    assert_eq!(resolved, entity("demo"));
}

#[tokio::test]
async fn resolve_unknown_channel_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client(&server)
        .resolve(&ChannelName::parse("ghost").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::ChannelNotFound { channel } if channel == "ghost"));
}

#[tokio::test]
async fn resolve_rate_limited_reads_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/demo"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "17"))
        .mount(&server)
        .await;

    let err = client(&server)
        .resolve(&ChannelName::parse("demo").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SourceError::RateLimited {
            retry_after_secs: 17,
            ..
        }
    ));
}

// ---------------------------------------------------------------------------
// messages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn messages_follow_offset_cursor_across_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/demo/messages"))
        .and(query_param_is_missing("offset_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [raw_message(5), raw_message(4)],
            "next_offset_id": 4
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels/demo/messages"))
        .and(query_param("offset_id", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [raw_message(3)],
            "next_offset_id": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let demo = entity("demo");
    let ids: Vec<i64> = client
        .messages(&demo, 10)
        .map(|item| item.unwrap().id)
        .collect()
        .await;

    assert_eq!(ids, [5, 4, 3]);
}

#[tokio::test]
async fn messages_stop_at_limit_without_fetching_more_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/demo/messages"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [raw_message(9), raw_message(8)],
            "next_offset_id": 8
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let demo = entity("demo");
    let items: Vec<_> = client.messages(&demo, 2).collect().await;

    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn malformed_element_is_item_level_and_stream_continues() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/demo/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [raw_message(3), {"id": "not-a-number"}, raw_message(1)],
            "next_offset_id": null
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let demo = entity("demo");
    let items: Vec<_> = client.messages(&demo, 10).collect().await;

    assert_eq!(items.len(), 3);
    assert!(items[0].is_ok());
    assert!(items[1].as_ref().unwrap_err().is_item_level());
    assert_eq!(items[2].as_ref().unwrap().id, 1);
}

#[tokio::test]
async fn rate_limited_page_ends_stream_with_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/demo/messages"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = client(&server);
    let demo = entity("demo");
    let items: Vec<_> = client.messages(&demo, 10).collect().await;

    assert_eq!(items.len(), 1);
    assert!(matches!(
        items[0],
        Err(SourceError::RateLimited {
            retry_after_secs: 60,
            ..
        })
    ));
}

// ---------------------------------------------------------------------------
// download_photo
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_photo_returns_body_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/demo/messages/7/photo"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
        .mount(&server)
        .await;

    let bytes = client(&server)
        .download_photo(&entity("demo"), 7)
        .await
        .unwrap();

    assert_eq!(bytes, [0xFF, 0xD8, 0xFF]);
}

#[tokio::test]
async fn download_photo_server_error_is_unexpected_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/demo/messages/7/photo"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server)
        .download_photo(&entity("demo"), 7)
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::UnexpectedStatus { status: 503, .. }));
}

#[test]
fn rejects_unparseable_base_url() {
    let result = GatewayClient::new("not a url", None, 5, "ua");
    assert!(matches!(result, Err(SourceError::InvalidBaseUrl { .. })));
}
