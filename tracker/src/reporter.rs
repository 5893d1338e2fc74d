//! HTTP reporting client for the Pocket Watch server.
//!
//! This module issues the outbound calls the tracker makes: location updates
//! (movement-driven, heartbeat, and manual), the unauthenticated health
//! probe, and the manual-location listing. It has side effects only and
//! never mutates tracking state.
//!
//! There is deliberately no retry queue and no backoff: a failed report is
//! logged by the caller and permanently lost. Failures are still returned as
//! typed errors so a caller that wants to act on them can.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::types::{LocationSample, LocationUpdateRequest, ManualLocation, ManualLocationRequest};

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur while talking to the server.
#[derive(Error, Debug)]
pub enum ReporterError {
    /// Transport-level failure (timeout, DNS, connection refused).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned a non-success status.
    #[error("server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Configuration for the reporting client.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Server base URL (e.g. `https://watch.example.com`).
    pub base_url: String,
}

impl ReporterConfig {
    /// Creates a new reporter configuration.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self { base_url }
    }
}

/// Client for the server's location-reporting API.
pub struct Reporter {
    config: ReporterConfig,
    client: Client,
}

impl Reporter {
    /// Creates a new reporter with a pooled HTTP client.
    #[must_use]
    pub fn new(config: ReporterConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .pool_max_idle_per_host(2)
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Reports a single position to the server.
    ///
    /// # Errors
    ///
    /// Returns `ReporterError` on transport failure or any non-2xx status.
    pub async fn report_location(
        &self,
        token: &str,
        sample: &LocationSample,
    ) -> Result<(), ReporterError> {
        let url = format!("{}/api/updateUserLocation", self.config.base_url);
        let body = LocationUpdateRequest::from(sample);

        debug!(
            url = %url,
            heartbeat = sample.is_heartbeat,
            timestamp_ms = sample.timestamp_ms,
            "Reporting location"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        check_status(response).await
    }

    /// Probes server reachability.
    ///
    /// Used as a connectivity signal when a manual ping has no position to
    /// report. Unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns `ReporterError` on transport failure or any non-2xx status.
    pub async fn health_check(&self) -> Result<(), ReporterError> {
        let url = format!("{}/api/health", self.config.base_url);

        debug!(url = %url, "Health check");

        let response = self.client.get(&url).send().await?;
        check_status(response).await
    }

    /// Fetches the named positions available for manual reporting.
    ///
    /// The server is known to double-encode this listing (a JSON string
    /// containing a JSON array); both encodings are accepted.
    ///
    /// # Errors
    ///
    /// Returns `ReporterError` on transport failure, non-2xx status, or an
    /// undecodable body.
    pub async fn manual_locations(&self, token: &str) -> Result<Vec<ManualLocation>, ReporterError> {
        let url = format!("{}/api/getManualLocations", self.config.base_url);

        debug!(url = %url, "Fetching manual locations");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ReporterError::ServerError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let value: serde_json::Value = serde_json::from_str(&body)?;

        let locations = match value {
            serde_json::Value::String(inner) => serde_json::from_str(&inner)?,
            other => serde_json::from_value(other)?,
        };

        Ok(locations)
    }

    /// Reports one of the server's named positions.
    ///
    /// # Errors
    ///
    /// Returns `ReporterError` on transport failure or any non-2xx status.
    pub async fn report_manual_location(
        &self,
        token: &str,
        position_id: &str,
    ) -> Result<(), ReporterError> {
        let url = format!("{}/api/updateUserLocationManual", self.config.base_url);
        let body = ManualLocationRequest {
            position_id: position_id.to_string(),
        };

        debug!(url = %url, position_id = %position_id, "Reporting manual location");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        check_status(response).await
    }
}

/// Converts a non-success response into a `ServerError`.
async fn check_status(response: reqwest::Response) -> Result<(), ReporterError> {
    let status = response.status();

    if status.is_success() {
        return Ok(());
    }

    let message = response.text().await.unwrap_or_default();

    if status == StatusCode::UNAUTHORIZED {
        debug!("Server rejected bearer token");
    }

    Err(ReporterError::ServerError {
        status: status.as_u16(),
        message,
    })
}
