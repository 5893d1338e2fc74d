//! Integration tests for pushing configuration changes into a live
//! registration.

mod common;

use common::Harness;
use pocketwatch_tracker::settings::Accuracy;

#[tokio::test]
async fn update_config_is_a_noop_without_a_live_registration() {
    let harness = Harness::new();
    let service = harness.service();

    service.update_config().await.unwrap();
    assert!(harness.scheduler.location_options().is_none());
    assert!(harness.scheduler.heartbeat_minutes().is_none());
}

#[tokio::test]
async fn update_config_reregisters_with_new_parameters() {
    let harness = Harness::new();
    let service = harness.service();

    service.toggle().await.unwrap();
    let before = harness.scheduler.location_options().unwrap();
    assert_eq!(before.time_interval_ms, 120_000);
    assert_eq!(before.accuracy, Accuracy::High);

    harness.settings.set("timeInterval", 5_000);
    harness.settings.set("accuracy", "low");
    service.update_config().await.unwrap();

    let after = harness.scheduler.location_options().unwrap();
    assert_eq!(after.time_interval_ms, 5_000);
    assert_eq!(after.accuracy, Accuracy::Low);
}

#[tokio::test]
async fn update_config_registers_heartbeat_when_newly_enabled() {
    let harness = Harness::new();
    let service = harness.service();

    service.toggle().await.unwrap();
    assert_eq!(harness.scheduler.heartbeat_minutes(), None);

    harness.settings.set("heartbeatEnabled", true);
    harness.settings.set("heartbeatInterval", 25);
    service.update_config().await.unwrap();

    assert_eq!(harness.scheduler.heartbeat_minutes(), Some(25));
}

#[tokio::test]
async fn update_config_unregisters_heartbeat_when_disabled() {
    let harness = Harness::new();
    harness.settings.set("heartbeatEnabled", true);
    let service = harness.service();

    service.toggle().await.unwrap();
    assert!(harness.scheduler.heartbeat_minutes().is_some());

    harness.settings.set("heartbeatEnabled", false);
    service.update_config().await.unwrap();

    assert_eq!(harness.scheduler.heartbeat_minutes(), None);
    // The location registration itself stays live.
    assert!(harness.scheduler.location_options().is_some());
}
