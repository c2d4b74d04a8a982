use crate::event::{parse_events, ChangeEvent};
use crate::layout::EntityPosition;
use crate::state::HistoryEntry;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Fixed message for any non-2xx history response
pub const HISTORY_FETCH_FAILED: &str = "Failed to fetch entity history";

/// Bulk snapshot response body.
///
/// `success: false` or a missing `data` field makes the response invalid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<EntityPosition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
}

/// Validated bulk snapshot
#[derive(Debug, Clone)]
pub struct BulkSnapshot {
    pub events: Vec<ChangeEvent>,
    pub positions: Vec<EntityPosition>,
    /// Producer-side metrics, passed through untouched
    pub metrics: Option<Value>,
}

impl SnapshotResponse {
    /// Check the envelope and validate each event record.
    ///
    /// Malformed records are skipped; only the envelope can fail.
    pub fn into_snapshot(self) -> Result<BulkSnapshot, FetchError> {
        if !self.success {
            return Err(FetchError::InvalidResponse("success is false".to_string()));
        }
        let data = self
            .data
            .ok_or_else(|| FetchError::InvalidResponse("missing data field".to_string()))?;

        let events = parse_events(&data);
        if events.len() < data.len() {
            warn!(
                skipped = data.len() - events.len(),
                total = data.len(),
                "Snapshot contained malformed events"
            );
        }

        Ok(BulkSnapshot {
            events,
            positions: self.positions.unwrap_or_default(),
            metrics: self.metrics,
        })
    }
}

/// Parameters of a history query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn for_entity(entity_id: &str) -> Self {
        Self {
            entity_id: Some(entity_id.to_string()),
            ..Default::default()
        }
    }
}

/// Fetch failures surfaced to the caller; never retried here
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Network or body decoding failure
    Transport(String),
    /// Non-2xx snapshot response
    Status(u16),
    /// Envelope present but unusable
    InvalidResponse(String),
    /// Non-2xx (or undecodable) history response
    History,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(e) => write!(f, "snapshot request failed: {}", e),
            FetchError::Status(code) => write!(f, "snapshot request returned HTTP {}", code),
            FetchError::InvalidResponse(reason) => {
                write!(f, "invalid snapshot response: {}", reason)
            }
            FetchError::History => write!(f, "{}", HISTORY_FETCH_FAILED),
        }
    }
}

impl std::error::Error for FetchError {}

/// HTTP client for the bulk snapshot and history endpoints
pub struct SnapshotClient {
    http_client: Client,
    snapshot_url: String,
    history_url: String,
}

impl SnapshotClient {
    pub fn new(
        snapshot_url: String,
        history_url: String,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http_client = Client::builder()
            .user_agent("vigil/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            http_client,
            snapshot_url,
            history_url,
        })
    }

    /// GET the bulk snapshot.
    pub async fn fetch_snapshot(&self) -> Result<BulkSnapshot, FetchError> {
        info!(url = %self.snapshot_url, "Fetching bulk snapshot");

        let response = self
            .http_client
            .get(&self.snapshot_url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: SnapshotResponse = response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;

        body.into_snapshot()
    }

    /// GET property history for one entity.
    pub async fn fetch_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<HistoryEntry>, FetchError> {
        let response = self
            .http_client
            .get(&self.history_url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "History request failed");
            return Err(FetchError::History);
        }

        response.json().await.map_err(|_| FetchError::History)
    }
}
