//! Ports onto the platform scheduler and location provider.
//!
//! The tracker never owns the truth about background registrations: the
//! scheduler does. These traits are the seam between the tracking service
//! and whatever executes scheduled work on the platform, whether that is
//! the tokio-backed [`executor`](crate::executor) in this repository or a
//! fake in tests. The service only queries registration state and requests
//! changes to it.

use async_trait::async_trait;
use thiserror::Error;

use crate::settings::{Accuracy, ReportingConfig};
use crate::types::{LocationSample, PermissionStatus};

/// Task id for scheduler-driven location updates.
pub const LOCATION_TASK_NAME: &str = "DOBBY_TRACKING_SERVICE";

/// Task id for the periodic heartbeat.
pub const HEARTBEAT_TASK_NAME: &str = "KREATURE_TRACKING_SERVICE";

/// The two background task kinds the tracker registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    LocationUpdates,
    Heartbeat,
}

impl TaskKind {
    /// Stable task id used with the scheduler.
    #[must_use]
    pub fn task_id(self) -> &'static str {
        match self {
            Self::LocationUpdates => LOCATION_TASK_NAME,
            Self::Heartbeat => HEARTBEAT_TASK_NAME,
        }
    }
}

/// Notification shown while location updates run in the background.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ForegroundNotification {
    pub title: String,
    pub body: String,
}

impl Default for ForegroundNotification {
    fn default() -> Self {
        Self {
            title: "Dobby is Following".to_string(),
            body: "Location tracking from Pocket Watch is happening in the background."
                .to_string(),
        }
    }
}

/// Parameters for a location-updates registration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LocationUpdateOptions {
    pub accuracy: Accuracy,
    pub time_interval_ms: u64,
    pub distance_interval_meters: u32,
    pub foreground_notification: ForegroundNotification,
}

impl LocationUpdateOptions {
    /// Builds registration options from a freshly resolved config.
    #[must_use]
    pub fn from_config(config: &ReportingConfig) -> Self {
        Self {
            accuracy: config.accuracy,
            time_interval_ms: config.time_interval_ms,
            distance_interval_meters: config.distance_interval_meters,
            foreground_notification: ForegroundNotification::default(),
        }
    }
}

/// Errors from scheduler registration operations.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The named task has no handler defined with the scheduler.
    #[error("task {task_id} is not defined")]
    TaskNotDefined { task_id: String },

    /// The scheduler rejected a registration change.
    #[error("registration failed for {task_id}: {message}")]
    Registration { task_id: String, message: String },

    /// Durable registration state could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Durable registration state is corrupt.
    #[error("registration state error: {0}")]
    State(#[from] serde_json::Error),
}

/// Errors from position acquisition.
#[derive(Error, Debug)]
pub enum LocationError {
    /// No position can be produced right now.
    #[error("no position available")]
    Unavailable,

    /// The platform refused access to location data.
    #[error("location permission denied")]
    PermissionDenied,

    /// The position source could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registration surface of the platform scheduler.
///
/// Both execution contexts may call this concurrently; implementations own
/// whatever synchronization and durability that requires. Registration state
/// must survive process restarts: it is the single source of truth the
/// service resyncs against.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// True when a handler for `kind` has been defined ahead of time.
    fn is_task_defined(&self, kind: TaskKind) -> bool;

    /// Queries the actual current registration state for `kind`.
    async fn is_registered(&self, kind: TaskKind) -> Result<bool, SchedulerError>;

    /// Registers the location-updates task with the given parameters,
    /// replacing any existing registration.
    async fn start_location_updates(
        &self,
        options: LocationUpdateOptions,
    ) -> Result<(), SchedulerError>;

    /// Removes the location-updates registration.
    async fn stop_location_updates(&self) -> Result<(), SchedulerError>;

    /// Registers the periodic heartbeat task.
    async fn register_heartbeat(&self, interval_minutes: u32) -> Result<(), SchedulerError>;

    /// Removes the heartbeat registration.
    async fn unregister_heartbeat(&self) -> Result<(), SchedulerError>;
}

/// Position and permission surface of the platform location provider.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Current foreground location permission.
    async fn foreground_permission(&self) -> PermissionStatus;

    /// Current background location permission.
    async fn background_permission(&self) -> PermissionStatus;

    /// Asks the platform to grant foreground location access.
    async fn request_foreground_permission(&self) -> PermissionStatus;

    /// Asks the platform to grant background location access.
    async fn request_background_permission(&self) -> PermissionStatus;

    /// Most recent position known to the platform, if any.
    async fn last_known_position(&self) -> Option<LocationSample>;

    /// Acquires a fresh position at the requested accuracy.
    async fn current_position(&self, accuracy: Accuracy) -> Result<LocationSample, LocationError>;
}
