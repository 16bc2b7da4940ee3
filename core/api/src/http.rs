//! HTTP client for the check-in server API.

use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use async_trait::async_trait;

use gatecheck_common::{AttendeeRecord, Error, EventId, Result};

use crate::server::{CheckinSubmission, RemotePage, ServerApi, SubmitOutcome};

/// Check-in server client over HTTP.
///
/// Transport failures and 5xx responses map to [`Error::Transient`] so the
/// sync engine retries them; conflict verdicts arrive as regular
/// [`SubmitOutcome`] values, not errors.
pub struct HttpServerApi {
    http: Client,
    base: String,
}

impl HttpServerApi {
    /// Create a new client for a server base URL.
    pub fn new(base: Url) -> Self {
        let http = Client::builder()
            .user_agent("GateCheck/0.1")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base: base.as_str().trim_end_matches('/').to_string(),
        }
    }

    fn checkins_url(&self, event: &EventId) -> String {
        format!("{}/events/{}/checkins", self.base, event)
    }

    fn attendees_url(&self, event: &EventId) -> String {
        format!("{}/events/{}/attendees", self.base, event)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)))
        } else if status == StatusCode::NOT_FOUND {
            Err(Error::NotFound("Resource not found".to_string()))
        } else if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Transient(format!(
                "Server error: {} - {}",
                status, body
            )))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Validation(format!(
                "API error: {} - {}",
                status, body
            )))
        }
    }
}

#[async_trait]
impl ServerApi for HttpServerApi {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit_checkin(
        &self,
        event: &EventId,
        submission: &CheckinSubmission,
    ) -> Result<SubmitOutcome> {
        let url = self.checkins_url(event);
        debug!(
            url = %url,
            sequence = submission.sequence,
            "Submitting check-in"
        );

        let response = self
            .http
            .post(&url)
            .json(submission)
            .send()
            .await
            .map_err(|e| Error::Transient(format!("Failed to submit check-in: {}", e)))?;

        // The conflict verdict rides on a 409 with the same body shape.
        if response.status() == StatusCode::CONFLICT {
            return response
                .json()
                .await
                .map_err(|e| Error::Serialization(format!("Failed to parse conflict: {}", e)));
        }

        self.handle_response(response).await
    }

    async fn checkins_since(&self, event: &EventId, cursor: u64) -> Result<RemotePage> {
        let response = self
            .http
            .get(self.checkins_url(event))
            .query(&[("since", cursor.to_string())])
            .send()
            .await
            .map_err(|e| Error::Transient(format!("Failed to pull check-ins: {}", e)))?;

        self.handle_response(response).await
    }

    async fn fetch_roster(&self, event: &EventId) -> Result<Vec<AttendeeRecord>> {
        let response = self
            .http
            .get(self.attendees_url(event))
            .send()
            .await
            .map_err(|e| Error::Transient(format!("Failed to fetch roster: {}", e)))?;

        self.handle_response(response).await
    }
}
