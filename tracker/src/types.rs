//! Core types for the Pocket Watch tracker.
//!
//! This module defines the tracking state shown to the user, the location
//! samples exchanged with the reporting client, and the wire types for the
//! server contract. Wire types serialize to the exact JSON shapes the server
//! expects; everything else is internal.

use serde::{Deserialize, Serialize};

/// Icon displayed for the current tracking state.
///
/// Serialized values match the icon names the UI layer binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingIcon {
    /// Tracking is stopped; tapping starts it.
    #[serde(rename = "play-circle")]
    Play,

    /// Tracking is running; tapping stops it.
    #[serde(rename = "stop-circle")]
    Stop,

    /// A toggle is in flight. Callers should disable the control while this
    /// icon is shown.
    #[serde(rename = "progress-clock")]
    Transitioning,

    /// Manual reporting mode; tapping opens the manual update flow.
    #[serde(rename = "map-marker")]
    ManualMarker,
}

/// How location reports reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportingMode {
    /// Scheduler-driven automatic reporting.
    Continuous,
    /// The user explicitly selects a position to report.
    Manual,
}

/// Displayed tracking state.
///
/// This is a cache for display only. The scheduler's registration table is
/// the durable source of truth; `resync` reconciles the two whenever the
/// owning screen becomes visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingState {
    /// Whether tracking is believed to be running.
    pub started: bool,

    /// Icon for the toggle control.
    pub icon: TrackingIcon,

    /// Reporting mode the state was last computed under.
    pub reporting_mode: ReportingMode,
}

impl TrackingState {
    /// Initial state: not started, play icon.
    #[must_use]
    pub fn initial(reporting_mode: ReportingMode) -> Self {
        Self {
            started: false,
            icon: TrackingIcon::Play,
            reporting_mode,
        }
    }
}

/// A single position fix.
///
/// Produced by the location provider (or synthesized by the heartbeat
/// handler), consumed exactly once by the reporting client, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,

    /// Fix time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,

    /// True when this sample exists only to prove liveness.
    #[serde(default)]
    pub is_heartbeat: bool,
}

impl LocationSample {
    /// Creates a movement-driven sample.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp_ms,
            is_heartbeat: false,
        }
    }

    /// Marks this sample as a heartbeat report.
    #[must_use]
    pub fn into_heartbeat(mut self) -> Self {
        self.is_heartbeat = true;
        self
    }
}

/// Location permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

impl PermissionStatus {
    /// True only for an explicit grant.
    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Body of `POST /api/updateUserLocation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdateRequest {
    pub location: Coordinates,
    pub heartbeat: bool,
}

impl From<&LocationSample> for LocationUpdateRequest {
    fn from(sample: &LocationSample) -> Self {
        Self {
            location: Coordinates {
                latitude: sample.latitude,
                longitude: sample.longitude,
            },
            heartbeat: sample.is_heartbeat,
        }
    }
}

/// Coordinate pair nested inside a location update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A named server-side position available for manual reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualLocation {
    pub id: String,
    pub name: String,
}

/// Body of `POST /api/updateUserLocationManual`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualLocationRequest {
    #[serde(rename = "positionID")]
    pub position_id: String,
}
