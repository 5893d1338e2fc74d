//! Location tracking service: the state machine and public API.
//!
//! The service owns the displayed [`TrackingState`] and reconciles it with
//! the scheduler's registration table, which is the only durable truth about
//! whether tracking is on. The foreground context calls [`toggle`],
//! [`resync`], [`update_config`] and [`send_ping`]; background reporting
//! happens elsewhere, in the scheduled [`handlers`](crate::handlers).
//!
//! State machine: `Stopped → Transitioning → Started` and back. The
//! `Transitioning` icon doubles as the "operation in flight" signal: callers
//! are expected to disable the toggle control while it shows, and an
//! internal busy flag rejects re-entrant toggles regardless.
//!
//! [`toggle`]: TrackingService::toggle
//! [`resync`]: TrackingService::resync
//! [`update_config`]: TrackingService::update_config
//! [`send_ping`]: TrackingService::send_ping

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::credentials::CredentialMirror;
use crate::error::{Result, TrackerError};
use crate::feedback::FeedbackChannel;
use crate::reporter::{Reporter, ReporterConfig};
use crate::scheduler::{LocationProvider, LocationUpdateOptions, TaskKind, TaskScheduler};
use crate::settings::{ConfigResolver, ReportingConfig};
use crate::types::{ReportingMode, TrackingIcon, TrackingState};

/// Delay between flipping the started flag and settling the final icon.
const ICON_SETTLE_DELAY_MS: u64 = 500;

/// Feedback shown when tracking starts.
const FEEDBACK_STARTED: &str = "Location Reporting successfully started.";

/// Feedback shown when tracking stops.
const FEEDBACK_STOPPED: &str = "Location Reporting successfully stopped.";

/// Feedback shown when the background permission blocks a start attempt.
const FEEDBACK_PERMISSION_DENIED: &str = "Background location permission denied.";

/// Current bearer token as held by the foreground session.
///
/// The session-acquisition flow itself lives outside this crate; the tracker
/// only ever asks for the current token so it can mirror it for the
/// background context.
pub trait SessionProvider: Send + Sync {
    /// Returns the current bearer token, or `None` when signed out.
    fn bearer_token(&self) -> Option<String>;
}

/// Timing knobs for the service.
#[derive(Debug, Clone, Copy)]
pub struct ServicePolicy {
    /// Pause between the state flip and the final icon, smoothing the
    /// transition visually.
    pub icon_settle_delay: Duration,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            icon_settle_delay: Duration::from_millis(ICON_SETTLE_DELAY_MS),
        }
    }
}

impl ServicePolicy {
    /// Policy with no artificial delays, for tests.
    #[must_use]
    pub fn fast_for_tests() -> Self {
        Self {
            icon_settle_delay: Duration::ZERO,
        }
    }
}

/// What a `toggle` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Tracking was started.
    Started,
    /// Tracking was stopped.
    Stopped,
    /// Manual reporting mode: the caller should open the manual update flow.
    ManualFlowRequested,
    /// Background permission is missing; nothing was registered.
    PermissionDenied,
    /// The location task has no handler defined with the scheduler.
    TaskNotDefined,
    /// Another toggle is already in flight; this call did nothing.
    Busy,
}

/// What a `send_ping` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    /// A position was available and reported.
    Reported,
    /// No position yet; the server was probed instead.
    HealthChecked,
}

/// Resets the busy flag when a toggle finishes, on every exit path.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The background location tracking service.
pub struct TrackingService {
    scheduler: Arc<dyn TaskScheduler>,
    provider: Arc<dyn LocationProvider>,
    session: Arc<dyn SessionProvider>,
    credentials: Arc<dyn CredentialMirror>,
    resolver: ConfigResolver,
    feedback: FeedbackChannel,
    policy: ServicePolicy,
    state: watch::Sender<TrackingState>,
    busy: AtomicBool,
}

impl TrackingService {
    /// Creates a new tracking service.
    ///
    /// The initial state is stopped with the play icon; call
    /// [`resync`](Self::resync) once the owning screen is visible to pick up
    /// the registration truth.
    #[must_use]
    pub fn new(
        scheduler: Arc<dyn TaskScheduler>,
        provider: Arc<dyn LocationProvider>,
        session: Arc<dyn SessionProvider>,
        credentials: Arc<dyn CredentialMirror>,
        resolver: ConfigResolver,
        policy: ServicePolicy,
    ) -> Self {
        let reporting_mode = resolver.resolve().reporting_mode;
        let (state, _) = watch::channel(TrackingState::initial(reporting_mode));

        Self {
            scheduler,
            provider,
            session,
            credentials,
            resolver,
            feedback: FeedbackChannel::new(),
            policy,
            state,
            busy: AtomicBool::new(false),
        }
    }

    /// Returns the current displayed state.
    #[must_use]
    pub fn state(&self) -> TrackingState {
        *self.state.borrow()
    }

    /// Subscribes to displayed-state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TrackingState> {
        self.state.subscribe()
    }

    /// The feedback channel surfacing status messages for this service.
    #[must_use]
    pub fn feedback(&self) -> &FeedbackChannel {
        &self.feedback
    }

    /// Starts or stops tracking, depending on the scheduler's actual current
    /// registration state (never the cached flag).
    ///
    /// In manual reporting mode this never contacts the scheduler and only
    /// signals that the manual update flow should open.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError` when a scheduler or credential operation
    /// fails. The displayed state is restored to what preceded the attempt
    /// and no feedback is emitted.
    pub async fn toggle(&self) -> Result<ToggleOutcome> {
        let config = self.resolver.resolve();

        if config.reporting_mode == ReportingMode::Manual {
            debug!("Manual reporting mode, requesting manual update flow");
            self.state
                .send_modify(|s| s.reporting_mode = ReportingMode::Manual);
            return Ok(ToggleOutcome::ManualFlowRequested);
        }

        if !self.scheduler.is_task_defined(TaskKind::LocationUpdates) {
            // Nothing to start without a handler; leave the state alone.
            warn!(
                task_id = TaskKind::LocationUpdates.task_id(),
                "Location task is not defined, ignoring toggle"
            );
            return Ok(ToggleOutcome::TaskNotDefined);
        }

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Toggle already in flight, rejecting re-entrant call");
            return Ok(ToggleOutcome::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        let previous = *self.state.borrow();
        self.state.send_modify(|s| {
            s.icon = TrackingIcon::Transitioning;
            s.reporting_mode = ReportingMode::Continuous;
        });

        match self.toggle_registered(&config).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(error = %e, "Toggle abandoned");
                self.state.send_replace(previous);
                Err(e)
            }
        }
    }

    /// The scheduler-touching half of `toggle`, separated so the caller can
    /// restore state on any error.
    async fn toggle_registered(&self, config: &ReportingConfig) -> Result<ToggleOutcome> {
        let registered = self.scheduler.is_registered(TaskKind::LocationUpdates).await?;

        if registered {
            if self.scheduler.is_registered(TaskKind::Heartbeat).await? {
                self.scheduler.unregister_heartbeat().await?;
            }
            self.scheduler.stop_location_updates().await?;

            self.state.send_modify(|s| s.started = false);
            self.settle_icon(TrackingIcon::Play).await;
            self.feedback.show(FEEDBACK_STOPPED);
            info!("Location reporting stopped");
            return Ok(ToggleOutcome::Stopped);
        }

        if !self.provider.background_permission().await.is_granted() {
            warn!("Background location permission denied, not starting");
            self.state.send_modify(|s| s.started = false);
            self.settle_icon(TrackingIcon::Play).await;
            self.feedback.show(FEEDBACK_PERMISSION_DENIED);
            return Ok(ToggleOutcome::PermissionDenied);
        }

        // The background context has no access to session state, so the
        // token is mirrored into durable storage before anything runs.
        match self.session.bearer_token() {
            Some(token) => self.credentials.store(&token)?,
            None => warn!("Session has no bearer token to mirror"),
        }

        if config.heartbeat_enabled {
            self.scheduler
                .register_heartbeat(config.heartbeat_interval_minutes)
                .await?;
        }

        if let Err(e) = self
            .scheduler
            .start_location_updates(LocationUpdateOptions::from_config(config))
            .await
        {
            // The heartbeat task must not outlive a failed start.
            if config.heartbeat_enabled {
                if let Err(cleanup) = self.scheduler.unregister_heartbeat().await {
                    warn!(error = %cleanup, "Failed to roll back heartbeat registration");
                }
            }
            return Err(e.into());
        }

        self.state.send_modify(|s| s.started = true);
        self.settle_icon(TrackingIcon::Stop).await;
        self.feedback.show(FEEDBACK_STARTED);
        info!("Location reporting started");
        Ok(ToggleOutcome::Started)
    }

    /// Reconciles the displayed state with the scheduler's registration
    /// truth. Called whenever the owning screen becomes visible.
    ///
    /// The in-memory started flag is not authoritative across process
    /// restarts; only the registration table is. No feedback is emitted.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError` when the registration query fails.
    pub async fn resync(&self) -> Result<TrackingState> {
        let config = self.resolver.resolve();

        if config.reporting_mode == ReportingMode::Manual {
            self.state.send_modify(|s| {
                s.icon = TrackingIcon::ManualMarker;
                s.reporting_mode = ReportingMode::Manual;
            });
            return Ok(*self.state.borrow());
        }

        if self.busy.load(Ordering::Acquire) {
            debug!("Toggle in flight, skipping resync");
            return Ok(*self.state.borrow());
        }

        let registered = self.scheduler.is_registered(TaskKind::LocationUpdates).await?;
        let state = TrackingState {
            started: registered,
            icon: if registered {
                TrackingIcon::Stop
            } else {
                TrackingIcon::Play
            },
            reporting_mode: ReportingMode::Continuous,
        };

        debug!(registered, "Resynced tracking state");
        self.state.send_replace(state);
        Ok(state)
    }

    /// Re-reads all reporting parameters and pushes them into the live
    /// registration, replacing it. A no-op when tracking is not registered.
    ///
    /// Whether tracking should be stopped before editing configuration is
    /// the caller's policy, not enforced here.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError` when re-registration fails.
    pub async fn update_config(&self) -> Result<()> {
        let config = self.resolver.resolve();
        debug!(
            accuracy = ?config.accuracy,
            time_interval_ms = config.time_interval_ms,
            distance_interval_meters = config.distance_interval_meters,
            heartbeat_enabled = config.heartbeat_enabled,
            "Updating location config"
        );

        if !self.scheduler.is_registered(TaskKind::LocationUpdates).await? {
            debug!("No live registration to reconfigure");
            return Ok(());
        }

        self.scheduler
            .start_location_updates(LocationUpdateOptions::from_config(&config))
            .await?;

        // Reconcile the heartbeat registration against the new config.
        if config.heartbeat_enabled {
            self.scheduler
                .register_heartbeat(config.heartbeat_interval_minutes)
                .await?;
        } else if self.scheduler.is_registered(TaskKind::Heartbeat).await? {
            self.scheduler.unregister_heartbeat().await?;
        }

        Ok(())
    }

    /// Reports the last known position immediately, or probes the server
    /// when no position exists yet.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError` when no server URL is configured, no bearer
    /// token is available for a report, or the network call fails.
    pub async fn send_ping(&self) -> Result<PingOutcome> {
        let base_url = self.resolver.base_url().ok_or(TrackerError::MissingServerUrl)?;
        let reporter = Reporter::new(ReporterConfig::new(base_url));

        match self.provider.last_known_position().await {
            Some(sample) => {
                let token = self
                    .session
                    .bearer_token()
                    .or(self.credentials.load()?)
                    .ok_or(TrackerError::MissingToken)?;

                reporter.report_location(&token, &sample).await?;
                info!(
                    timestamp_ms = sample.timestamp_ms,
                    "Manual ping reported last known position"
                );
                Ok(PingOutcome::Reported)
            }
            None => {
                // No fix yet; prove the path to the server instead.
                reporter.health_check().await?;
                info!("Manual ping fell back to health check");
                Ok(PingOutcome::HealthChecked)
            }
        }
    }

    /// Applies the final icon after the smoothing delay.
    async fn settle_icon(&self, icon: TrackingIcon) {
        if !self.policy.icon_settle_delay.is_zero() {
            tokio::time::sleep(self.policy.icon_settle_delay).await;
        }
        self.state.send_modify(|s| s.icon = icon);
    }
}
