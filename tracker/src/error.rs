//! Error types for the Pocket Watch tracker.

use thiserror::Error;

use crate::credentials::CredentialError;
use crate::reporter::ReporterError;
use crate::scheduler::SchedulerError;

/// Errors surfaced by tracking service operations.
///
/// Operations never panic and never leave an in-flight transition dangling:
/// a returned error means the operation was abandoned with the displayed
/// state restored to what preceded the attempt.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Scheduler registration query or change failed.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Outbound report or probe failed.
    #[error("reporting error: {0}")]
    Reporter(#[from] ReporterError),

    /// Credential mirror could not be read or written.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// No server base URL has been configured in the settings store.
    #[error("no server URL configured")]
    MissingServerUrl,

    /// Neither the session nor the credential mirror has a bearer token.
    #[error("no bearer token available")]
    MissingToken,
}

/// A specialized `Result` type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_error_conversion() {
        let err: TrackerError = SchedulerError::TaskNotDefined {
            task_id: "DOBBY_TRACKING_SERVICE".to_string(),
        }
        .into();
        assert!(matches!(err, TrackerError::Scheduler(_)));
        assert_eq!(
            err.to_string(),
            "scheduler error: task DOBBY_TRACKING_SERVICE is not defined"
        );
    }

    #[test]
    fn missing_server_url_display() {
        assert_eq!(
            TrackerError::MissingServerUrl.to_string(),
            "no server URL configured"
        );
    }
}
