//! Location provider backed by an externally written fix file.
//!
//! On a headless device there is no platform location API; instead some
//! producer (a GPS daemon, a test harness) drops the latest fix as JSON at a
//! known path and this provider reads it. Location permission maps onto
//! filesystem access: the provider is "granted" when the drop point exists.
//!
//! Fix file shape:
//!
//! ```json
//! { "latitude": 51.5074, "longitude": -0.1278, "timestampMs": 1700000000000 }
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{trace, warn};

use crate::scheduler::{LocationError, LocationProvider};
use crate::settings::Accuracy;
use crate::types::{LocationSample, PermissionStatus};

/// Reads position fixes from a JSON file.
#[derive(Debug, Clone)]
pub struct FilePositionSource {
    path: PathBuf,
}

impl FilePositionSource {
    /// Creates a provider reading fixes from `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Where this provider expects fixes to be dropped.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn permission(&self) -> PermissionStatus {
        match self.path.parent() {
            Some(parent) if parent.as_os_str().is_empty() || parent.exists() => {
                PermissionStatus::Granted
            }
            Some(_) => PermissionStatus::Denied,
            None => PermissionStatus::Denied,
        }
    }

    fn read_fix(&self) -> Result<LocationSample, LocationError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LocationError::Unavailable);
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(LocationError::PermissionDenied);
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<LocationSample>(&contents) {
            Ok(sample) => Ok(sample),
            Err(e) => {
                // A half-written or malformed fix is treated as no fix.
                warn!(path = %self.path.display(), error = %e, "Ignoring malformed fix file");
                Err(LocationError::Unavailable)
            }
        }
    }
}

#[async_trait]
impl LocationProvider for FilePositionSource {
    async fn foreground_permission(&self) -> PermissionStatus {
        self.permission()
    }

    async fn background_permission(&self) -> PermissionStatus {
        self.permission()
    }

    async fn request_foreground_permission(&self) -> PermissionStatus {
        self.request_background_permission().await
    }

    async fn request_background_permission(&self) -> PermissionStatus {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    warn!(path = %parent.display(), error = %e, "Could not create fix drop point");
                }
            }
        }
        self.permission()
    }

    async fn last_known_position(&self) -> Option<LocationSample> {
        self.read_fix().ok()
    }

    async fn current_position(&self, accuracy: Accuracy) -> Result<LocationSample, LocationError> {
        trace!(?accuracy, "Reading current fix");
        self.read_fix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_means_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = FilePositionSource::new(dir.path().join("position.json"));

        assert!(matches!(
            source.current_position(Accuracy::High).await,
            Err(LocationError::Unavailable)
        ));
        assert!(source.last_known_position().await.is_none());
    }

    #[tokio::test]
    async fn fix_file_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("position.json");
        std::fs::write(
            &path,
            r#"{"latitude":51.5074,"longitude":-0.1278,"timestampMs":1700000000000}"#,
        )
        .unwrap();

        let source = FilePositionSource::new(path);
        let sample = source.current_position(Accuracy::High).await.unwrap();

        assert_eq!(sample.latitude, 51.5074);
        assert_eq!(sample.longitude, -0.1278);
        assert_eq!(sample.timestamp_ms, 1_700_000_000_000);
        assert!(!sample.is_heartbeat);
    }

    #[tokio::test]
    async fn malformed_fix_is_treated_as_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("position.json");
        std::fs::write(&path, "{ definitely not json").unwrap();

        let source = FilePositionSource::new(path);
        assert!(matches!(
            source.current_position(Accuracy::High).await,
            Err(LocationError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn permission_follows_drop_point_existence() {
        let dir = tempfile::tempdir().unwrap();

        let present = FilePositionSource::new(dir.path().join("position.json"));
        assert!(present.background_permission().await.is_granted());

        let absent = FilePositionSource::new(dir.path().join("missing/position.json"));
        assert!(!absent.background_permission().await.is_granted());

        // Requesting access creates the drop point.
        assert!(absent.request_background_permission().await.is_granted());
    }
}
