//! Route session against a mock telemetry API.

mod provider;

use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use fleet::RouteSession;
use pretty_assertions::assert_eq;
use serde_json::json;
use telemetry::{ApiClient, RangeOptions, TimeWindow};

use self::provider::{BASE_URL, MockProvider, respond};

fn window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2025, 10, 17, 10, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 10, 17, 12, 0, 0).unwrap(),
    )
    .unwrap()
}

fn page() -> serde_json::Value {
    json!({
        "data": [
            {"deviceId": "7", "dateTime": "2025-10-17T10:30:00Z", "data": {"v": 12}},
            {"deviceId": "7", "dateTime": "2025-10-17T10:00:00Z", "data": {"v": 0}}
        ],
        "meta": {"hasNext": false}
    })
}

#[tokio::test]
async fn load_makes_route_current() {
    // Should store a loaded route as the current one.
    let provider = MockProvider::new(|_| respond(200, &page()));
    let client = ApiClient::new(provider, BASE_URL);
    let session = RouteSession::new();

    let route =
        session.load(&client, "7", window(), &RangeOptions::default()).await.unwrap().unwrap();

    assert_eq!(route.device_id, "7");
    assert_eq!(route.readings.len(), 2);
    assert!(route.readings[0].timestamp < route.readings[1].timestamp);
    assert_eq!(session.current().await, Some(route));
}

#[tokio::test]
async fn superseded_load_is_dropped() {
    // Should drop a result once a newer query has started.
    let session = Arc::new(RouteSession::new());
    let slot: Arc<Mutex<Option<Arc<RouteSession>>>> = Arc::default();

    // a newer query starts while the first request is in flight
    let newer = Arc::clone(&slot);
    let provider = MockProvider::new(move |_| {
        if let Some(session) = newer.lock().expect("lock").take() {
            session.begin();
        }
        respond(200, &page())
    });
    *slot.lock().unwrap() = Some(Arc::clone(&session));

    let client = ApiClient::new(provider, BASE_URL);
    let loaded = session.load(&client, "7", window(), &RangeOptions::default()).await.unwrap();

    assert_eq!(loaded, None);
    assert_eq!(session.current().await, None);
}

#[tokio::test]
async fn failed_load_keeps_previous_route() {
    // Should return the error and leave the current route alone.
    let provider = MockProvider::new(|_| respond(200, &page()));
    let session = RouteSession::new();
    let first = session
        .load(&ApiClient::new(provider, BASE_URL), "7", window(), &RangeOptions::default())
        .await
        .unwrap();

    let failing = MockProvider::new(|_| respond(500, &json!({"message": "boom"})));
    let err = session
        .load(&ApiClient::new(failing, BASE_URL), "7", window(), &RangeOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "upstream");
    assert_eq!(session.current().await, first);
}
