//! Tokio-backed background task executor.
//!
//! This is the in-process stand-in for the platform scheduler: it keeps the
//! registration table durable on disk and, when running, drives the two
//! background handlers on their configured cadence. The table file is the
//! channel between execution contexts: a short-lived foreground process
//! registers a task and exits, and a running executor picks the change up on
//! its next reconcile pass. Registrations therefore survive process
//! restarts, which is exactly what makes them the source of truth the
//! tracking service resyncs against.
//!
//! # Architecture
//!
//! - [`TaskExecutor`] implements [`TaskScheduler`] by reading and writing
//!   `registrations.json` under the state directory. Every query re-reads
//!   the file so cross-process changes are always visible.
//! - [`TaskExecutor::run`] reconciles running tokio tasks against the table
//!   once a second: registrations gain a task loop, removals stop it, and
//!   parameter changes restart it. Stopping is cooperative, so an in-flight
//!   report always runs to completion.
//! - The location loop polls the provider and forwards movement-driven
//!   fixes to [`handle_location_updates`]; the heartbeat loop fires on its
//!   minimum interval and calls [`handle_heartbeat`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use async_trait::async_trait;

use crate::handlers::{handle_heartbeat, handle_location_updates, HandlerContext};
use crate::scheduler::{
    LocationError, LocationProvider, LocationUpdateOptions, SchedulerError, TaskKind, TaskScheduler,
};
use crate::types::LocationSample;

/// File name for the durable registration table.
const REGISTRATIONS_FILE: &str = "registrations.json";

/// How often the running executor reconciles tasks against the table.
const RECONCILE_INTERVAL: Duration = Duration::from_secs(1);

/// Floor for the location poll period, whatever the configured interval.
const MIN_POLL_INTERVAL_MS: u64 = 1_000;

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Durable registration table, one slot per task kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct RegistrationTable {
    /// Parameters of the location-updates registration, if registered.
    location_updates: Option<LocationUpdateOptions>,

    /// Heartbeat interval in minutes, if registered.
    heartbeat_interval_minutes: Option<u32>,
}

/// A spawned task loop and its stop signal.
///
/// Stopping is cooperative: the signal is only observed between
/// invocations, so an in-flight report is never cancelled by an
/// unregistration.
struct TaskHandle {
    stop: watch::Sender<bool>,

    /// Kept so the loop's task is owned somewhere; the loop exits on the
    /// stop signal rather than by abort.
    #[allow(dead_code)]
    join: JoinHandle<()>,
}

impl TaskHandle {
    fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

/// Task loops currently running, together with the table state they were
/// spawned from.
#[derive(Default)]
struct RunningTasks {
    applied: RegistrationTable,
    location: Option<TaskHandle>,
    heartbeat: Option<TaskHandle>,
}

/// Scheduler implementation with a durable registration table.
pub struct TaskExecutor {
    table_path: PathBuf,
    ctx: HandlerContext,
    provider: std::sync::Arc<dyn LocationProvider>,
    running: Mutex<RunningTasks>,
}

impl TaskExecutor {
    /// Creates an executor storing its registration table under `state_dir`.
    #[must_use]
    pub fn new(
        state_dir: &Path,
        ctx: HandlerContext,
        provider: std::sync::Arc<dyn LocationProvider>,
    ) -> Self {
        Self {
            table_path: state_dir.join(REGISTRATIONS_FILE),
            ctx,
            provider,
            running: Mutex::new(RunningTasks::default()),
        }
    }

    /// Drives registered tasks until `shutdown` resolves.
    ///
    /// Previously persisted registrations are resumed on the first
    /// reconcile pass; there is no separate resume step.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError` when the registration table cannot be read.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) -> Result<(), SchedulerError> {
        info!(table = %self.table_path.display(), "Background task executor running");

        let mut ticker = tokio::time::interval(RECONCILE_INTERVAL);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => self.reconcile().await?,
            }
        }

        // Stop loops without touching the registration table: the
        // registrations outlive this process by design.
        let mut running = self.running.lock().await;
        if let Some(task) = running.location.take() {
            task.stop();
        }
        if let Some(task) = running.heartbeat.take() {
            task.stop();
        }
        running.applied = RegistrationTable::default();

        info!("Background task executor stopped");
        Ok(())
    }

    /// Brings running task loops in line with the durable table.
    async fn reconcile(&self) -> Result<(), SchedulerError> {
        let table = self.load_table()?;
        let mut running = self.running.lock().await;

        if table.location_updates != running.applied.location_updates {
            if let Some(task) = running.location.take() {
                task.stop();
            }
            if let Some(options) = table.location_updates.clone() {
                debug!(
                    task_id = TaskKind::LocationUpdates.task_id(),
                    time_interval_ms = options.time_interval_ms,
                    "Starting location task loop"
                );
                let (stop_tx, stop_rx) = watch::channel(false);
                let join = tokio::spawn(location_loop(
                    self.ctx.clone(),
                    std::sync::Arc::clone(&self.provider),
                    options,
                    stop_rx,
                ));
                running.location = Some(TaskHandle { stop: stop_tx, join });
            } else {
                debug!(
                    task_id = TaskKind::LocationUpdates.task_id(),
                    "Location task unregistered"
                );
            }
        }

        if table.heartbeat_interval_minutes != running.applied.heartbeat_interval_minutes {
            if let Some(task) = running.heartbeat.take() {
                task.stop();
            }
            if let Some(minutes) = table.heartbeat_interval_minutes {
                debug!(
                    task_id = TaskKind::Heartbeat.task_id(),
                    interval_minutes = minutes,
                    "Starting heartbeat task loop"
                );
                let (stop_tx, stop_rx) = watch::channel(false);
                let join = tokio::spawn(heartbeat_loop(self.ctx.clone(), minutes, stop_rx));
                running.heartbeat = Some(TaskHandle { stop: stop_tx, join });
            } else {
                debug!(task_id = TaskKind::Heartbeat.task_id(), "Heartbeat task unregistered");
            }
        }

        running.applied = table;
        Ok(())
    }

    fn load_table(&self) -> Result<RegistrationTable, SchedulerError> {
        let contents = match std::fs::read_to_string(&self.table_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RegistrationTable::default());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_str(&contents)?)
    }

    fn save_table(&self, table: &RegistrationTable) -> Result<(), SchedulerError> {
        if let Some(parent) = self.table_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.table_path, serde_json::to_string_pretty(table)?)?;
        Ok(())
    }
}

#[async_trait]
impl TaskScheduler for TaskExecutor {
    fn is_task_defined(&self, _kind: TaskKind) -> bool {
        // Handlers are compiled into this binary; both tasks always have one.
        true
    }

    async fn is_registered(&self, kind: TaskKind) -> Result<bool, SchedulerError> {
        let table = self.load_table()?;
        Ok(match kind {
            TaskKind::LocationUpdates => table.location_updates.is_some(),
            TaskKind::Heartbeat => table.heartbeat_interval_minutes.is_some(),
        })
    }

    async fn start_location_updates(
        &self,
        options: LocationUpdateOptions,
    ) -> Result<(), SchedulerError> {
        let mut table = self.load_table()?;
        table.location_updates = Some(options);
        self.save_table(&table)
    }

    async fn stop_location_updates(&self) -> Result<(), SchedulerError> {
        let mut table = self.load_table()?;
        table.location_updates = None;
        self.save_table(&table)
    }

    async fn register_heartbeat(&self, interval_minutes: u32) -> Result<(), SchedulerError> {
        let mut table = self.load_table()?;
        table.heartbeat_interval_minutes = Some(interval_minutes);
        self.save_table(&table)
    }

    async fn unregister_heartbeat(&self) -> Result<(), SchedulerError> {
        let mut table = self.load_table()?;
        table.heartbeat_interval_minutes = None;
        self.save_table(&table)
    }
}

/// Polls the provider and forwards movement-driven fixes to the location
/// handler.
///
/// The stop signal is checked only between ticks, so an invocation that is
/// already awaiting the network runs to completion.
async fn location_loop(
    ctx: HandlerContext,
    provider: std::sync::Arc<dyn LocationProvider>,
    options: LocationUpdateOptions,
    mut stop: watch::Receiver<bool>,
) {
    let period = Duration::from_millis(options.time_interval_ms.max(MIN_POLL_INTERVAL_MS));
    let mut ticker = tokio::time::interval(period);
    let mut last_reported: Option<LocationSample> = None;

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }

        match provider.current_position(options.accuracy).await {
            Ok(fix) => {
                if let Some(prev) = last_reported {
                    if fix.timestamp_ms <= prev.timestamp_ms {
                        trace!("No new fix since last report");
                        continue;
                    }
                    let moved = distance_meters(
                        prev.latitude,
                        prev.longitude,
                        fix.latitude,
                        fix.longitude,
                    );
                    if moved < f64::from(options.distance_interval_meters) {
                        trace!(moved_m = moved, "Movement below distance interval");
                        continue;
                    }
                }

                let outcome = handle_location_updates(&ctx, Ok(vec![fix])).await;
                if outcome.is_success() {
                    last_reported = Some(fix);
                }
            }
            Err(LocationError::Unavailable) => {
                trace!("No position available this tick");
            }
            Err(e) => {
                // Delivered to the handler as the error signal for this
                // invocation; terminal, no retry.
                warn!(error = %e, "Location provider error");
                let _ = handle_location_updates(&ctx, Err(e)).await;
            }
        }
    }

    debug!(task_id = TaskKind::LocationUpdates.task_id(), "Location task loop exited");
}

/// Fires the heartbeat handler on its minimum interval.
async fn heartbeat_loop(ctx: HandlerContext, interval_minutes: u32, mut stop: watch::Receiver<bool>) {
    let period = Duration::from_secs(u64::from(interval_minutes) * 60);
    let start = tokio::time::Instant::now() + period;
    let mut ticker = tokio::time::interval_at(start, period);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }

        let outcome = handle_heartbeat(&ctx).await;
        debug!(success = outcome.is_success(), "Heartbeat invocation finished");
    }

    debug!(task_id = TaskKind::Heartbeat.task_id(), "Heartbeat task loop exited");
}

/// Great-circle distance between two coordinates, in meters.
fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}
