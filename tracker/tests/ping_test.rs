//! Integration tests for the manual ping.
//!
//! A ping reports the last known position when one exists, and falls back
//! to the unauthenticated health probe when none does. Absence of a
//! position is not an error.

mod common;

use common::{FakeLocationProvider, Harness};
use pocketwatch_tracker::error::TrackerError;
use pocketwatch_tracker::service::PingOutcome;
use pocketwatch_tracker::types::LocationSample;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn ping_reports_last_known_position() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/updateUserLocation"))
        .and(header("authorization", "Bearer portkey-token"))
        .and(body_json(serde_json::json!({
            "location": { "latitude": 51.5074, "longitude": -0.1278 },
            "heartbeat": false
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut harness = Harness::new();
    harness.provider = FakeLocationProvider::with_position(LocationSample::new(
        51.5074,
        -0.1278,
        1_700_000_000_000,
    ));
    harness.settings.set("url", mock_server.uri());
    let service = harness.service();

    let outcome = service.send_ping().await.unwrap();
    assert_eq!(outcome, PingOutcome::Reported);
}

#[tokio::test]
async fn ping_without_position_falls_back_to_health_check() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/updateUserLocation"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut harness = Harness::new();
    harness.settings.set("url", mock_server.uri());
    let service = harness.service();

    let outcome = service.send_ping().await.unwrap();
    assert_eq!(outcome, PingOutcome::HealthChecked);
}

#[tokio::test]
async fn ping_requires_a_configured_server_url() {
    let harness = Harness::new();
    let service = harness.service();

    let err = service.send_ping().await.unwrap_err();
    assert!(matches!(err, TrackerError::MissingServerUrl));
}

#[tokio::test]
async fn ping_surfaces_network_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/updateUserLocation"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let mut harness = Harness::new();
    harness.provider =
        FakeLocationProvider::with_position(LocationSample::new(1.0, 2.0, 1_000));
    harness.settings.set("url", mock_server.uri());
    let service = harness.service();

    let err = service.send_ping().await.unwrap_err();
    assert!(matches!(err, TrackerError::Reporter(_)));
}
