//! Reporting configuration resolved from the settings store.
//!
//! The settings store itself is an external collaborator: a persisted
//! key/value space owned by the surrounding application. This module defines
//! the read-only port the tracker consumes ([`SettingsStore`]), a file-backed
//! default implementation so the daemon is runnable on its own
//! ([`JsonSettingsStore`]), and the [`ConfigResolver`] that turns raw keys
//! into a typed [`ReportingConfig`].
//!
//! Configuration is read fresh at every registration or reconfiguration
//! point and never cached across operations, since values may change between
//! toggles.
//!
//! # Keys
//!
//! | Key | Type | Default |
//! |-----|------|---------|
//! | `accuracy` | string or integer | `high` |
//! | `distanceInterval` | integer (meters) | 50 |
//! | `timeInterval` | integer (milliseconds) | 120000 |
//! | `heartbeatEnabled` | boolean | false |
//! | `heartbeatInterval` | integer (minutes) | 15 |
//! | `reportingMode` | `continuous` \| `manual` | `continuous` |
//! | `url` | string | - |

use std::path::PathBuf;

use serde_json::Value;
use tracing::warn;

use crate::types::ReportingMode;

/// Default distance interval in meters.
const DEFAULT_DISTANCE_INTERVAL_METERS: u32 = 50;

/// Default time interval in milliseconds.
const DEFAULT_TIME_INTERVAL_MS: u64 = 120_000;

/// Default heartbeat interval in minutes.
const DEFAULT_HEARTBEAT_INTERVAL_MINUTES: u32 = 15;

/// Read-only port onto the persisted settings key space.
///
/// Implementations must be cheap to call repeatedly: the resolver re-reads
/// every key on each operation.
pub trait SettingsStore: Send + Sync {
    /// Returns the raw value for `name`, or `None` when unset.
    fn get(&self, name: &str) -> Option<Value>;
}

/// Settings store backed by a single JSON object on disk.
///
/// The file is re-read on every lookup so that edits made by the owning
/// application (or by hand) are picked up without any notification channel.
/// A missing or unreadable file behaves as an empty store.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    /// Creates a store reading from `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_object(&self) -> Option<serde_json::Map<String, Value>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read settings file");
                return None;
            }
        };

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => {
                warn!(path = %self.path.display(), "Settings file is not a JSON object");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Settings file is not valid JSON");
                None
            }
        }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get(&self, name: &str) -> Option<Value> {
        self.read_object()?.get(name).cloned()
    }
}

/// Location accuracy requested from the platform provider.
///
/// Lower accuracies let the implementation avoid power-hungry providers such
/// as GPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    /// Accurate to the nearest three kilometers.
    Lowest,
    /// Accurate to the nearest kilometer.
    Low,
    /// Accurate to within one hundred meters.
    Balanced,
    /// Accurate to within ten meters.
    High,
    /// The best level of accuracy available.
    Highest,
}

impl Accuracy {
    /// Parses a stored value, accepting both the string form and the legacy
    /// integer levels (1 = lowest .. 5 = highest).
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => match s.as_str() {
                "lowest" => Some(Self::Lowest),
                "low" => Some(Self::Low),
                "balanced" => Some(Self::Balanced),
                "high" => Some(Self::High),
                "highest" => Some(Self::Highest),
                _ => None,
            },
            Value::Number(n) => match n.as_i64()? {
                1 => Some(Self::Lowest),
                2 => Some(Self::Low),
                3 => Some(Self::Balanced),
                4 => Some(Self::High),
                5 => Some(Self::Highest),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Typed snapshot of the reporting parameters.
///
/// Built by [`ConfigResolver::resolve`] for exactly one operation; callers
/// must not hold on to it across toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingConfig {
    pub accuracy: Accuracy,
    pub distance_interval_meters: u32,
    pub time_interval_ms: u64,
    pub heartbeat_enabled: bool,
    pub heartbeat_interval_minutes: u32,
    pub reporting_mode: ReportingMode,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::High,
            distance_interval_meters: DEFAULT_DISTANCE_INTERVAL_METERS,
            time_interval_ms: DEFAULT_TIME_INTERVAL_MS,
            heartbeat_enabled: false,
            heartbeat_interval_minutes: DEFAULT_HEARTBEAT_INTERVAL_MINUTES,
            reporting_mode: ReportingMode::Continuous,
        }
    }
}

/// Pure lookup over a [`SettingsStore`]; holds no state of its own.
#[derive(Clone)]
pub struct ConfigResolver {
    store: std::sync::Arc<dyn SettingsStore>,
}

impl ConfigResolver {
    /// Creates a resolver over the given store.
    #[must_use]
    pub fn new(store: std::sync::Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Reads all reporting parameters, substituting defaults for unset or
    /// malformed values.
    #[must_use]
    pub fn resolve(&self) -> ReportingConfig {
        let defaults = ReportingConfig::default();

        let accuracy = self
            .store
            .get("accuracy")
            .and_then(|v| Accuracy::from_value(&v))
            .unwrap_or(defaults.accuracy);

        let distance_interval_meters = self
            .store
            .get("distanceInterval")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(defaults.distance_interval_meters);

        let time_interval_ms = self
            .store
            .get("timeInterval")
            .and_then(|v| v.as_u64())
            .unwrap_or(defaults.time_interval_ms);

        let heartbeat_enabled = self
            .store
            .get("heartbeatEnabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.heartbeat_enabled);

        let heartbeat_interval_minutes = self
            .store
            .get("heartbeatInterval")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.heartbeat_interval_minutes);

        let reporting_mode = self
            .store
            .get("reportingMode")
            .and_then(|v| serde_json::from_value::<ReportingMode>(v).ok())
            .unwrap_or(defaults.reporting_mode);

        ReportingConfig {
            accuracy,
            distance_interval_meters,
            time_interval_ms,
            heartbeat_enabled,
            heartbeat_interval_minutes,
            reporting_mode,
        }
    }

    /// Returns the configured server base URL, if one has been stored.
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.store
            .get("url")
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty())
    }
}
