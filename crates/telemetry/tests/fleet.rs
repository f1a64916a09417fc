mod provider;

use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use telemetry::fleet::{self, STALE_AFTER_HOURS};
use telemetry::{ApiClient, FleetStatus};

use self::provider::{BASE_URL, MockProvider, respond, respond_text};

#[tokio::test]
async fn snapshot_and_summary() {
    // Should fall back to per-device requests, skip the ones that fail and bucket the rest.
    let provider = MockProvider::new(|request| match request.uri().path() {
        "/proxy/gps/device/1/last-reading" => respond(
            200,
            &json!({"deviceId": "1", "dateTime": "2025-10-17T11:50:00Z", "data": {"v": 30}}),
        ),
        "/proxy/gps/device/2/last-reading" => respond(
            200,
            &json!({"deviceId": "2", "dateTime": "2025-10-17T11:55:00Z", "data": {"v": 0, "ev": 30}}),
        ),
        "/proxy/gps/device/3/last-reading" => {
            respond(200, &json!({"deviceId": "3", "dateTime": "251017T010000Z", "data": {"v": 12}}))
        }
        _ => respond_text(500, "unavailable"),
    });
    let client = ApiClient::new(provider, BASE_URL);
    let ids: Vec<String> = ["1", "2", "3", "4"].iter().map(ToString::to_string).collect();

    let readings = fleet::snapshot(&client, &ids).await;
    assert_eq!(readings.len(), 3);

    // the bulk request fails, then one request per device
    let requests = client.provider().requests();
    assert_eq!(requests.len(), 5);
    assert_eq!(requests[0].path, "/proxy/gps/device/last-reading");

    let now = Utc.with_ymd_and_hms(2025, 10, 17, 12, 0, 0).unwrap();
    let status =
        FleetStatus::summarize(&ids, &readings, now, Duration::hours(STALE_AFTER_HOURS));

    assert_eq!(
        status,
        FleetStatus {
            total: 4,
            in_transit: vec!["1".to_string()],
            stopped: vec!["2".to_string()],
            stale: vec!["3".to_string()],
            other: Vec::new(),
            unreported: vec!["4".to_string()],
        }
    );
}

#[tokio::test]
async fn bulk_snapshot() {
    // Should cover the whole fleet with a single bulk request.
    let provider = MockProvider::new(|request| match request.uri().path() {
        "/proxy/gps/device/last-reading" => respond(
            200,
            &json!([
                {"deviceId": "1", "dateTime": "2025-10-17T11:50:00Z", "data": {"v": 30}},
                {"deviceId": "2", "dateTime": "2025-10-17T11:55:00Z", "data": {"v": 0}},
                {"deviceId": "9", "dateTime": "2025-10-17T11:55:00Z", "data": {"v": 0}}
            ]),
        ),
        path => respond_text(404, path),
    });
    let client = ApiClient::new(provider, BASE_URL);
    let ids: Vec<String> = ["1", " 2", "1"].iter().map(ToString::to_string).collect();

    let readings = fleet::snapshot(&client, &ids).await;

    let mut devices: Vec<&str> = readings.iter().map(|r| r.device_id.as_str()).collect();
    devices.sort_unstable();
    assert_eq!(devices, vec!["1", "2"]);

    let requests = client.provider().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].param("ids").as_deref(), Some("1,2"));
}

#[tokio::test]
async fn partial_bulk_snapshot() {
    // Should fetch only the devices the bulk response left out.
    let provider = MockProvider::new(|request| match request.uri().path() {
        "/proxy/gps/device/last-reading" => respond(
            200,
            &json!({"data": [{"deviceId": "1", "dateTime": "2025-10-17T11:50:00Z", "data": {"v": 30}}]}),
        ),
        "/proxy/gps/device/2/last-reading" => {
            respond(200, &json!({"dateTime": "2025-10-17T11:55:00Z", "data": {"v": 0}}))
        }
        path => respond_text(404, path),
    });
    let client = ApiClient::new(provider, BASE_URL);
    let ids: Vec<String> = ["1", "2", "3"].iter().map(ToString::to_string).collect();

    let readings = fleet::snapshot(&client, &ids).await;

    assert_eq!(readings.len(), 2);
    assert_eq!(readings[1].device_id, "2");

    let paths: Vec<String> = client.provider().requests().into_iter().map(|r| r.path).collect();
    assert_eq!(paths.len(), 3);
    assert_eq!(paths[0], "/proxy/gps/device/last-reading");
    assert!(paths.contains(&"/proxy/gps/device/2/last-reading".to_string()));
    assert!(paths.contains(&"/proxy/gps/device/3/last-reading".to_string()));
}
