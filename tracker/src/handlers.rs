//! Background task handlers.
//!
//! These two callbacks are invoked by the scheduler on its own timeline,
//! with no dependency on the foreground context existing at all. They are
//! fully self-contained: the bearer token comes from the credential mirror
//! (never from in-memory session state) and the endpoint is resolved from
//! the settings store on every invocation.
//!
//! All failures are caught here and converted into a [`TaskOutcome`]; nothing
//! unwinds into the scheduler.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::credentials::CredentialMirror;
use crate::reporter::{Reporter, ReporterConfig};
use crate::scheduler::{LocationError, LocationProvider};
use crate::settings::ConfigResolver;
use crate::types::LocationSample;

/// Signal returned to the scheduler at the end of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed,
}

impl TaskOutcome {
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Dependencies a handler invocation needs, independent of any foreground
/// object graph.
#[derive(Clone)]
pub struct HandlerContext {
    resolver: ConfigResolver,
    credentials: Arc<dyn CredentialMirror>,
    provider: Arc<dyn LocationProvider>,
}

impl HandlerContext {
    /// Creates a handler context.
    #[must_use]
    pub fn new(
        resolver: ConfigResolver,
        credentials: Arc<dyn CredentialMirror>,
        provider: Arc<dyn LocationProvider>,
    ) -> Self {
        Self {
            resolver,
            credentials,
            provider,
        }
    }

    /// Builds a reporter against the currently configured server URL.
    fn reporter(&self) -> Option<Reporter> {
        match self.resolver.base_url() {
            Some(base_url) => Some(Reporter::new(ReporterConfig::new(base_url))),
            None => {
                warn!("No server URL configured, cannot report");
                None
            }
        }
    }

    /// Reads the mirrored bearer token.
    fn token(&self) -> Option<String> {
        match self.credentials.load() {
            Ok(Some(token)) => Some(token),
            Ok(None) => {
                warn!("No mirrored token, cannot report");
                None
            }
            Err(e) => {
                error!(error = %e, "Failed to read mirrored token");
                None
            }
        }
    }
}

/// Handles one location-updates invocation.
///
/// The scheduler may deliver several fixes accumulated since the last
/// invocation; only the freshest is operationally relevant, so the sample
/// with the maximum timestamp is reported and the rest are discarded. An
/// error signal from the scheduler is terminal for the invocation: it is
/// logged and nothing is reported.
pub async fn handle_location_updates(
    ctx: &HandlerContext,
    input: Result<Vec<LocationSample>, LocationError>,
) -> TaskOutcome {
    let samples = match input {
        Ok(samples) => samples,
        Err(e) => {
            error!(error = %e, "Location task received error signal");
            return TaskOutcome::Failed;
        }
    };

    let Some(freshest) = samples.iter().max_by_key(|s| s.timestamp_ms).copied() else {
        debug!("Location task invoked with empty batch");
        return TaskOutcome::Success;
    };

    if samples.len() > 1 {
        debug!(
            received = samples.len(),
            timestamp_ms = freshest.timestamp_ms,
            "Discarding stale samples from batch"
        );
    }

    report(ctx, freshest).await
}

/// Handles one heartbeat invocation.
///
/// Acquires a fresh position at the configured accuracy and reports it with
/// the heartbeat flag set, guaranteeing a periodic liveness signal even when
/// the device is stationary.
pub async fn handle_heartbeat(ctx: &HandlerContext) -> TaskOutcome {
    let config = ctx.resolver.resolve();

    let sample = match ctx.provider.current_position(config.accuracy).await {
        Ok(sample) => sample.into_heartbeat(),
        Err(e) => {
            warn!(error = %e, "Heartbeat could not acquire a position");
            return TaskOutcome::Failed;
        }
    };

    report(ctx, sample).await
}

/// Sends one sample, converting every failure into an outcome.
async fn report(ctx: &HandlerContext, sample: LocationSample) -> TaskOutcome {
    let Some(reporter) = ctx.reporter() else {
        return TaskOutcome::Failed;
    };
    let Some(token) = ctx.token() else {
        return TaskOutcome::Failed;
    };

    match reporter.report_location(&token, &sample).await {
        Ok(()) => TaskOutcome::Success,
        Err(e) => {
            // No retry and no outbox: the report is lost.
            error!(error = %e, heartbeat = sample.is_heartbeat, "Failed to report location");
            TaskOutcome::Failed
        }
    }
}
