mod common;

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};

use bridge_api_server::AppState;
use bridge_bus::{BusClient, BusError, BusMessage, MemoryBus};
use bridge_engine::{Event, ImageProxy, MetadataStore};

fn event(value: Value) -> Event {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn content_type(resp: &reqwest::Response) -> String {
    resp.headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn metadata_before_any_event_is_empty_object() {
    let (addr, token) = common::spawn_plain(common::state(Arc::new(MetadataStore::new()))).await;

    let resp = reqwest::get(format!("http://{addr}/metadata")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(content_type(&resp), "text/json");
    assert_eq!(resp.text().await.unwrap(), "{}");
    token.cancel();
}

#[tokio::test]
async fn metadata_serves_last_seen_event() {
    let store = Arc::new(MetadataStore::new());
    store.publish("cam1", event(json!({"frame": 1, "topic": "cam1"})));
    store.publish("cam2", event(json!({"frame": 2, "topic": "cam2"})));
    let (addr, token) = common::spawn_plain(common::state(store)).await;

    let body: Value = reqwest::get(format!("http://{addr}/metadata"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"frame": 2, "topic": "cam2"}));

    let per_topic: Value = reqwest::get(format!("http://{addr}/metadata/cam1"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(per_topic["frame"], json!(1));

    let unseen = reqwest::get(format!("http://{addr}/metadata/cam9")).await.unwrap();
    assert_eq!(unseen.status(), StatusCode::NOT_FOUND);
    token.cancel();
}

#[tokio::test]
async fn non_get_metadata_is_empty_ok() {
    let store = Arc::new(MetadataStore::new());
    store.publish("cam1", event(json!({"frame": 1})));
    let (addr, token) = common::spawn_plain(common::state(store)).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/metadata"))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().is_empty());
    token.cancel();
}

#[tokio::test]
async fn health_is_ok() {
    let (addr, token) = common::spawn_plain(common::state(Arc::new(MetadataStore::new()))).await;
    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"status": "ok"}));
    token.cancel();
}

async fn image_state(strict: bool) -> AppState {
    let bus = MemoryBus::default();
    bus.register_service("ImageStore", |req: BusMessage| async move {
        match req.data["img_handle"].as_str() {
            Some("a1b2") => Ok(BusMessage::default().with_blob(vec![0xFF, 0xD8, 0xFF])),
            Some("slow") => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(BusMessage::default())
            }
            Some("broken") => Err(BusError::Closed),
            _ => Ok(BusMessage::default()),
        }
    });
    let requester = bus.service("ImageStore").await.unwrap();
    AppState {
        store: Arc::new(MetadataStore::new()),
        image: Some(Arc::new(ImageProxy::new(requester, Some(Duration::from_millis(100))))),
        image_error_status: strict,
    }
}

#[tokio::test]
async fn image_returns_blob_for_handle() {
    let (addr, token) = common::spawn_plain(image_state(false).await).await;

    let resp = reqwest::get(format!("http://{addr}/image?img_handle=a1b2")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(content_type(&resp), "image/jpeg; charset=utf-8");
    assert_eq!(resp.bytes().await.unwrap().to_vec(), vec![0xFF, 0xD8, 0xFF]);
    token.cancel();
}

#[tokio::test]
async fn image_failures_are_empty_ok_by_default() {
    let (addr, token) = common::spawn_plain(image_state(false).await).await;

    for query in ["img_handle=missing", "img_handle=broken", "img_handle=slow", "nonsense", ""] {
        let resp = reqwest::get(format!("http://{addr}/image?{query}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{query}");
        assert!(resp.bytes().await.unwrap().is_empty(), "{query}");
    }

    let still_up = reqwest::get(format!("http://{addr}/image?img_handle=a1b2")).await.unwrap();
    assert_eq!(still_up.bytes().await.unwrap().len(), 3);
    token.cancel();
}

#[tokio::test]
async fn image_failures_map_to_statuses_when_enabled() {
    let (addr, token) = common::spawn_plain(image_state(true).await).await;

    let cases = [
        ("img_handle=missing", StatusCode::NOT_FOUND),
        ("img_handle=broken", StatusCode::BAD_GATEWAY),
        ("img_handle=slow", StatusCode::GATEWAY_TIMEOUT),
        ("handle=a1b2", StatusCode::BAD_REQUEST),
    ];
    for (query, status) in cases {
        let resp = reqwest::get(format!("http://{addr}/image?{query}")).await.unwrap();
        assert_eq!(resp.status(), status, "{query}");
    }
    token.cancel();

    let mut no_store = common::state(Arc::new(MetadataStore::new()));
    no_store.image_error_status = true;
    let (addr, token) = common::spawn_plain(no_store).await;
    let resp = reqwest::get(format!("http://{addr}/image?img_handle=a1b2")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    token.cancel();
}

#[tokio::test]
async fn image_answers_other_methods_with_text() {
    let (addr, token) = common::spawn_plain(image_state(false).await).await;
    let client = reqwest::Client::new();

    let post = client.post(format!("http://{addr}/image")).send().await.unwrap();
    assert_eq!(post.text().await.unwrap(), "Received a POST request");

    let put = client.put(format!("http://{addr}/image")).send().await.unwrap();
    assert_eq!(
        put.text().await.unwrap(),
        "Sorry, only GET and POST methods are supported."
    );
    token.cancel();
}
