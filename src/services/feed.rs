//! CitiBike station feed client.
//!
//! Fetches the full station list in one GET. The upstream document is
//! `{"executionTime": "...", "stationBeanList": [...]}`; the retrieval time is
//! stamped onto the snapshot locally.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};

use crate::errors::AppError;
use crate::store::models::StationSnapshot;

/// Client for the station feed.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    url: String,
    user_agent: String,
}

impl FeedClient {
    pub fn new(url: &str, user_agent: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
            user_agent: user_agent.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Download and parse the current station list.
    pub async fn fetch_snapshot(&self) -> Result<StationSnapshot, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .map_err(|e| AppError::InternalError(format!("Invalid User-Agent: {}", e)))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .get(&self.url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Feed request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "Feed returned HTTP {}",
                response.status()
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            AppError::ExternalServiceError(format!("Failed to read feed body: {}", e))
        })?;

        let snapshot = parse_feed(&body, Utc::now())?;
        tracing::debug!(
            "Fetched {} stations (executionTime {:?})",
            snapshot.len(),
            snapshot.execution_time
        );
        Ok(snapshot)
    }
}

/// Parse a feed document and stamp it with `retrieved_at`.
///
/// Fields the model doesn't know are ignored. A body that isn't the expected
/// shape is an upstream failure, not an internal one.
pub fn parse_feed(body: &[u8], retrieved_at: DateTime<Utc>) -> Result<StationSnapshot, AppError> {
    let mut snapshot: StationSnapshot = serde_json::from_slice(body)
        .map_err(|e| AppError::ExternalServiceError(format!("Failed to parse feed: {}", e)))?;
    snapshot.timestamp = Some(retrieved_at);
    Ok(snapshot)
}
