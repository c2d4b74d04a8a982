use super::QueryError;
use crate::feed::{
    ConnectionState, FeedSession, FeedStatsSnapshot, SnapshotResponse, UpstreamStatus,
};
use crate::layout::{EntityPosition, SqlitePositionStore};
use crate::metrics::AggregatedMetrics;
use crate::state::{Entity, LoadStatus, StateEngine};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Shared state for the read-only query API
pub struct QueryAppState {
    pub state_engine: Arc<StateEngine>,
    pub session: Arc<FeedSession>,
    pub positions: PositionSource,
    /// Producer-side metrics from the bulk snapshot, if it carried any
    pub upstream_metrics: Option<Value>,
}

/// Where layout positions come from.
///
/// Non-expired rows of the local store win. When there is no store, or it
/// holds no active rows, the positions that arrived with the bulk snapshot
/// are served instead.
#[derive(Default)]
pub struct PositionSource {
    pub store: Option<Arc<SqlitePositionStore>>,
    pub upstream: Vec<EntityPosition>,
}

impl PositionSource {
    pub fn new(store: Option<Arc<SqlitePositionStore>>, upstream: Vec<EntityPosition>) -> Self {
        Self { store, upstream }
    }

    pub fn active(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<EntityPosition>> {
        if let Some(store) = &self.store {
            let stored = store.load_active(now)?;
            if !stored.is_empty() {
                return Ok(stored);
            }
        }
        Ok(self.upstream.clone())
    }
}

/// Feed and load health
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub connection: ConnectionState,
    pub upstream: Option<UpstreamStatus>,
    pub load_status: LoadStatus,
    pub entity_count: usize,
    pub stats: FeedStatsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_metrics: Option<Value>,
}

/// Create query API router
pub fn create_query_router(state: Arc<QueryAppState>) -> Router {
    Router::new()
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/entities", get(list_entities))
        .route("/api/entities/:id", get(get_entity))
        .route("/api/metrics", get(get_metrics))
        .route("/api/positions", get(list_positions))
        .route("/api/status", get(get_status))
        .with_state(state)
}

/// GET /api/snapshot - change log, positions and metrics in the bulk
/// snapshot envelope
async fn get_snapshot(
    State(state): State<Arc<QueryAppState>>,
) -> Result<Json<SnapshotResponse>, QueryError> {
    let data = state
        .state_engine
        .change_log()
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| QueryError::Internal(e.to_string()))?;

    let metrics = serde_json::to_value(&*state.state_engine.metrics())
        .map_err(|e| QueryError::Internal(e.to_string()))?;

    Ok(Json(SnapshotResponse {
        success: true,
        data: Some(data),
        positions: Some(active_positions(&state)?),
        metrics: Some(metrics),
    }))
}

/// GET /api/entities - all entities, sorted by id
async fn list_entities(State(state): State<Arc<QueryAppState>>) -> Json<Vec<Entity>> {
    Json(state.state_engine.get_all_entities())
}

/// GET /api/entities/:id
async fn get_entity(
    State(state): State<Arc<QueryAppState>>,
    Path(id): Path<String>,
) -> Result<Json<Entity>, QueryError> {
    state
        .state_engine
        .get_entity(&id)
        .map(Json)
        .ok_or(QueryError::NotFound("Entity not found"))
}

/// GET /api/metrics
async fn get_metrics(State(state): State<Arc<QueryAppState>>) -> Json<AggregatedMetrics> {
    Json((*state.state_engine.metrics()).clone())
}

/// GET /api/positions - non-expired layout records, else the snapshot's
async fn list_positions(
    State(state): State<Arc<QueryAppState>>,
) -> Result<Json<Vec<EntityPosition>>, QueryError> {
    Ok(Json(active_positions(&state)?))
}

/// GET /api/status
async fn get_status(State(state): State<Arc<QueryAppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        connection: state.session.state(),
        upstream: state.session.upstream_status(),
        load_status: state.state_engine.load_status(),
        entity_count: state.state_engine.snapshot().len(),
        stats: state.state_engine.stats.snapshot(),
        upstream_metrics: state.upstream_metrics.clone(),
    })
}

fn active_positions(state: &QueryAppState) -> Result<Vec<EntityPosition>, QueryError> {
    state.positions.active(Utc::now()).map_err(|e| {
        warn!(error = %e, "Failed to read layout positions");
        QueryError::Internal("failed to read layout positions".to_string())
    })
}
