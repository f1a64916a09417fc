mod provider;

use chrono::{TimeZone, Utc};
use http::Method;
use pretty_assertions::assert_eq;
use serde_json::json;
use telemetry::{ApiClient, Base, Coordinate, DeviceDetails, Session};

use self::provider::{BASE_URL, MockProvider, respond, respond_text};

fn session(user: serde_json::Value) -> Session {
    Session {
        token: "t0k3n".into(),
        user,
        metadata: Some(json!({"devices": ["7"], "devices_meta": {"7": {"name": "old"}}})),
    }
}

#[tokio::test]
async fn save_device_details() {
    // Should PATCH the merged document and keep it in the session.
    let provider = MockProvider::new(|_| respond(200, &json!({"ok": true})));
    let client = ApiClient::new(provider, BASE_URL).with_token("t0k3n");
    let mut session = session(json!({"id": 12, "role": "admin"}));

    let details = DeviceDetails { plate: Some("AB123CD".into()), ..DeviceDetails::default() };
    let now = Utc.with_ymd_and_hms(2025, 10, 17, 12, 0, 0).unwrap();
    let document = session.with_device_details("7", &details, now).unwrap();
    client.save_metadata(&mut session, document.clone()).await.unwrap();

    let requests = client.provider().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::PATCH);
    assert_eq!(requests[0].path, "/users/12/metadata");
    assert_eq!(
        requests[0].json()["devices_meta"]["7"],
        json!({"name": "old", "plate": "AB123CD", "updatedAt": "2025-10-17T12:00:00.000Z"})
    );
    assert_eq!(session.metadata, Some(document));
}

#[tokio::test]
async fn save_requires_edit_rights() {
    // Should refuse before sending anything when the account is not an admin.
    let provider = MockProvider::new(|_| respond(200, &json!({})));
    let client = ApiClient::new(provider, BASE_URL).with_token("t0k3n");
    let mut session = session(json!({"id": 12, "role": "viewer", "data": {"nivel": 3}}));
    let before = session.clone();

    let err = client.save_metadata(&mut session, json!({"devices": []})).await.unwrap_err();
    assert_eq!(err.code(), "forbidden");
    assert!(client.provider().requests().is_empty());
    assert_eq!(session, before);
}

#[tokio::test]
async fn failed_save_keeps_session() {
    // Should leave the session document alone when the API rejects the update.
    let provider = MockProvider::new(|_| respond_text(500, "boom"));
    let client = ApiClient::new(provider, BASE_URL).with_token("t0k3n");
    let mut session = session(json!({"id": 12, "data": {"nivel": 1}}));
    let before = session.clone();

    let corners = [
        Coordinate { lat: -26.80, lon: -65.20 },
        Coordinate { lat: -26.80, lon: -65.21 },
        Coordinate { lat: -26.81, lon: -65.21 },
        Coordinate { lat: -26.81, lon: -65.20 },
    ];
    let base = Base::new("Depot", corners, Utc::now()).unwrap();
    let document = session.with_base(&base).unwrap();

    let err = client.save_metadata(&mut session, document).await.unwrap_err();
    assert_eq!(err.code(), "upstream");
    assert_eq!(client.provider().requests().len(), 1);
    assert_eq!(session, before);
}
