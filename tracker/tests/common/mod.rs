//! Shared fakes for integration tests.
//!
//! The fakes model the collaborators at their contract boundaries: a
//! scheduler whose registration table outlives any one service instance, a
//! location provider with scriptable permission and fixes, an in-memory
//! settings store, and an in-memory credential mirror.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use pocketwatch_tracker::credentials::{CredentialError, CredentialMirror};
use pocketwatch_tracker::scheduler::{
    LocationError, LocationProvider, LocationUpdateOptions, SchedulerError, TaskKind, TaskScheduler,
};
use pocketwatch_tracker::service::{ServicePolicy, SessionProvider, TrackingService};
use pocketwatch_tracker::settings::{Accuracy, ConfigResolver, SettingsStore};
use pocketwatch_tracker::types::{LocationSample, PermissionStatus};

/// Registration table shared across scheduler handles, so a "restarted"
/// service sees the same durable truth.
#[derive(Debug, Default)]
pub struct FakeRegistrations {
    pub location_updates: Option<LocationUpdateOptions>,
    pub heartbeat_interval_minutes: Option<u32>,
}

/// Scriptable scheduler fake.
pub struct FakeScheduler {
    pub registrations: Arc<Mutex<FakeRegistrations>>,
    /// Whether the location task handler counts as defined.
    pub task_defined: bool,
    /// When true, location-updates registration is rejected.
    pub fail_registration: bool,
    /// Pause applied to registration queries, for in-flight toggle tests.
    pub query_delay_ms: u64,
    /// Total calls that touched the scheduler at all.
    pub calls: AtomicUsize,
}

impl FakeScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registrations: Arc::new(Mutex::new(FakeRegistrations::default())),
            task_defined: true,
            fail_registration: false,
            query_delay_ms: 0,
            calls: AtomicUsize::new(0),
        })
    }

    /// A scheduler handle sharing `registrations`, as after a process
    /// restart.
    pub fn sharing(registrations: Arc<Mutex<FakeRegistrations>>) -> Arc<Self> {
        Arc::new(Self {
            registrations,
            task_defined: true,
            fail_registration: false,
            query_delay_ms: 0,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_task_defined(task_defined: bool) -> Arc<Self> {
        Arc::new(Self {
            registrations: Arc::new(Mutex::new(FakeRegistrations::default())),
            task_defined,
            fail_registration: false,
            query_delay_ms: 0,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing_registration() -> Arc<Self> {
        Arc::new(Self {
            registrations: Arc::new(Mutex::new(FakeRegistrations::default())),
            task_defined: true,
            fail_registration: true,
            query_delay_ms: 0,
            calls: AtomicUsize::new(0),
        })
    }

    /// A scheduler whose registration queries take `delay_ms`, keeping a
    /// toggle in flight long enough to observe.
    pub fn slow(delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            registrations: Arc::new(Mutex::new(FakeRegistrations::default())),
            task_defined: true,
            fail_registration: false,
            query_delay_ms: delay_ms,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn location_options(&self) -> Option<LocationUpdateOptions> {
        self.registrations.lock().unwrap().location_updates.clone()
    }

    pub fn heartbeat_minutes(&self) -> Option<u32> {
        self.registrations.lock().unwrap().heartbeat_interval_minutes
    }
}

#[async_trait]
impl TaskScheduler for FakeScheduler {
    fn is_task_defined(&self, _kind: TaskKind) -> bool {
        self.task_defined
    }

    async fn is_registered(&self, kind: TaskKind) -> Result<bool, SchedulerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.query_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.query_delay_ms)).await;
        }
        let registrations = self.registrations.lock().unwrap();
        Ok(match kind {
            TaskKind::LocationUpdates => registrations.location_updates.is_some(),
            TaskKind::Heartbeat => registrations.heartbeat_interval_minutes.is_some(),
        })
    }

    async fn start_location_updates(
        &self,
        options: LocationUpdateOptions,
    ) -> Result<(), SchedulerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_registration {
            return Err(SchedulerError::Registration {
                task_id: TaskKind::LocationUpdates.task_id().to_string(),
                message: "rejected by test".to_string(),
            });
        }
        self.registrations.lock().unwrap().location_updates = Some(options);
        Ok(())
    }

    async fn stop_location_updates(&self) -> Result<(), SchedulerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.registrations.lock().unwrap().location_updates = None;
        Ok(())
    }

    async fn register_heartbeat(&self, interval_minutes: u32) -> Result<(), SchedulerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.registrations.lock().unwrap().heartbeat_interval_minutes = Some(interval_minutes);
        Ok(())
    }

    async fn unregister_heartbeat(&self) -> Result<(), SchedulerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.registrations.lock().unwrap().heartbeat_interval_minutes = None;
        Ok(())
    }
}

/// Scriptable location provider fake.
pub struct FakeLocationProvider {
    pub background_granted: bool,
    pub last_known: Option<LocationSample>,
}

impl FakeLocationProvider {
    pub fn granted() -> Arc<Self> {
        Arc::new(Self {
            background_granted: true,
            last_known: None,
        })
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self {
            background_granted: false,
            last_known: None,
        })
    }

    pub fn with_position(sample: LocationSample) -> Arc<Self> {
        Arc::new(Self {
            background_granted: true,
            last_known: Some(sample),
        })
    }
}

#[async_trait]
impl LocationProvider for FakeLocationProvider {
    async fn foreground_permission(&self) -> PermissionStatus {
        if self.background_granted {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    async fn background_permission(&self) -> PermissionStatus {
        if self.background_granted {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    async fn request_foreground_permission(&self) -> PermissionStatus {
        self.foreground_permission().await
    }

    async fn request_background_permission(&self) -> PermissionStatus {
        self.background_permission().await
    }

    async fn last_known_position(&self) -> Option<LocationSample> {
        self.last_known
    }

    async fn current_position(&self, _accuracy: Accuracy) -> Result<LocationSample, LocationError> {
        self.last_known.ok_or(LocationError::Unavailable)
    }
}

/// Mutable in-memory settings store.
#[derive(Default)]
pub struct MemorySettings {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemorySettings {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) {
        self.entries
            .lock()
            .unwrap()
            .insert(name.to_string(), value.into());
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, name: &str) -> Option<Value> {
        self.entries.lock().unwrap().get(name).cloned()
    }
}

/// In-memory credential mirror.
#[derive(Default)]
pub struct MemoryMirror {
    token: Mutex<Option<String>>,
}

impl MemoryMirror {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }
}

impl CredentialMirror for MemoryMirror {
    fn store(&self, token: &str) -> Result<(), CredentialError> {
        *self.token.lock().unwrap() = Some(token.to_string());
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.token.lock().unwrap().clone())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        *self.token.lock().unwrap() = None;
        Ok(())
    }
}

/// Session provider with a fixed token.
pub struct StaticSession(pub Option<String>);

impl SessionProvider for StaticSession {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Handles to every fake a test might want to script or inspect.
pub struct Harness {
    pub scheduler: Arc<FakeScheduler>,
    pub provider: Arc<FakeLocationProvider>,
    pub settings: Arc<MemorySettings>,
    pub mirror: Arc<MemoryMirror>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            scheduler: FakeScheduler::new(),
            provider: FakeLocationProvider::granted(),
            settings: MemorySettings::new(),
            mirror: MemoryMirror::new(),
        }
    }

    /// Builds a service over the current fakes.
    pub fn service(&self) -> TrackingService {
        TrackingService::new(
            Arc::clone(&self.scheduler) as Arc<dyn TaskScheduler>,
            Arc::clone(&self.provider) as Arc<dyn LocationProvider>,
            Arc::new(StaticSession(Some("portkey-token".to_string()))),
            Arc::clone(&self.mirror) as Arc<dyn CredentialMirror>,
            ConfigResolver::new(Arc::clone(&self.settings) as Arc<dyn SettingsStore>),
            ServicePolicy::fast_for_tests(),
        )
    }
}
