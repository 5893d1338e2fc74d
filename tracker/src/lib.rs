//! Pocket Watch Tracker - background location reporting client.
//!
//! This crate implements the background location tracking subsystem of the
//! Pocket Watch client: a state machine the foreground context toggles, two
//! scheduled background handlers that report positions to the server, and
//! the durable plumbing that lets those two execution contexts cooperate
//! without shared memory.
//!
//! # Overview
//!
//! The foreground context drives the [`service::TrackingService`], which
//! registers and unregisters background tasks with a scheduler. The
//! scheduler's registration table is durable and is the *only* source of
//! truth for whether tracking is on; the displayed state is a cache that
//! [`service::TrackingService::resync`] reconciles whenever the owning
//! screen becomes visible. Background handlers run on the scheduler's
//! timeline, read their bearer token from the durable credential mirror,
//! and report positions over HTTP.
//!
//! # Modules
//!
//! - [`types`]: tracking state, samples, and wire types
//! - [`settings`]: settings-store port and typed config resolution
//! - [`credentials`]: durable bearer-token mirror
//! - [`reporter`]: HTTP client for the server's reporting API
//! - [`scheduler`]: scheduler and location-provider ports
//! - [`executor`]: tokio-backed executor with a durable registration table
//! - [`position`]: fix-file location provider
//! - [`handlers`]: the two scheduled background callbacks
//! - [`service`]: the tracking state machine and public API
//! - [`feedback`]: auto-dismissing status messages
//! - [`config`]: daemon configuration from environment variables
//! - [`error`]: crate-level error type

pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod feedback;
pub mod handlers;
pub mod position;
pub mod reporter;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod types;

pub use config::{Config, ConfigError};
pub use credentials::{CredentialError, CredentialMirror, FileCredentialMirror};
pub use error::{Result, TrackerError};
pub use executor::TaskExecutor;
pub use feedback::{FeedbackChannel, FeedbackMessage};
pub use handlers::{handle_heartbeat, handle_location_updates, HandlerContext, TaskOutcome};
pub use position::FilePositionSource;
pub use reporter::{Reporter, ReporterConfig, ReporterError};
pub use scheduler::{
    ForegroundNotification, LocationError, LocationProvider, LocationUpdateOptions, SchedulerError,
    TaskKind, TaskScheduler, HEARTBEAT_TASK_NAME, LOCATION_TASK_NAME,
};
pub use service::{
    PingOutcome, ServicePolicy, SessionProvider, ToggleOutcome, TrackingService,
};
pub use settings::{Accuracy, ConfigResolver, JsonSettingsStore, ReportingConfig, SettingsStore};
pub use types::{
    Coordinates, LocationSample, LocationUpdateRequest, ManualLocation, ManualLocationRequest,
    PermissionStatus, ReportingMode, TrackingIcon, TrackingState,
};
