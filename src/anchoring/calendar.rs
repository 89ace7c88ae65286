//! Calendar server communication

use std::time::Duration;

use crate::anchoring::error::AnchorError;

/// HTTP client for an OpenTimestamps-style calendar server
pub struct CalendarClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl CalendarClient {
    /// Create a new calendar client with a bounded per-request timeout
    pub fn new(timeout: Duration) -> Result<Self, AnchorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnchorError::Network(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Submit a digest to the calendar and get the initial sequence blob
    pub async fn submit(
        &self,
        calendar_url: &str,
        digest: &[u8; 32],
    ) -> Result<Vec<u8>, AnchorError> {
        let url = format!("{}/digest", calendar_url.trim_end_matches('/'));
        tracing::debug!(url = %url, "submitting digest to calendar");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/octet-stream")
            .body(digest.to_vec())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            return Err(AnchorError::ServiceError(format!(
                "calendar returned status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AnchorError::Network(e.to_string()))?
            .to_vec();

        tracing::info!(calendar_url = %calendar_url, "digest submitted to calendar");

        Ok(bytes)
    }

    /// Look up the matured sequence for a pending commitment
    ///
    /// Sends GET to `{calendar_url}/timestamp/{hex_commitment}`. A 404 means
    /// the commitment is not chain-confirmed yet.
    pub async fn upgrade(
        &self,
        calendar_url: &str,
        commitment: &[u8],
    ) -> Result<Option<Vec<u8>>, AnchorError> {
        let url = format!(
            "{}/timestamp/{}",
            calendar_url.trim_end_matches('/'),
            hex::encode(commitment)
        );
        tracing::debug!(url = %url, "fetching upgraded sequence from calendar");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!("sequence not yet available at calendar");
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(AnchorError::ServiceError(format!(
                "calendar returned status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AnchorError::Network(e.to_string()))?
            .to_vec();

        Ok(Some(bytes))
    }

    fn classify(&self, e: reqwest::Error) -> AnchorError {
        if e.is_timeout() {
            AnchorError::Timeout(self.timeout.as_secs())
        } else {
            AnchorError::Network(e.to_string())
        }
    }
}
