use super::QueryError;
use crate::event::parse_timestamp;
use crate::feed::HistoryQuery;
use crate::state::{HistoryEntry, StateEngine};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::sync::Arc;

/// Shared state for history API
pub struct HistoryAppState {
    pub state_engine: Arc<StateEngine>,
    /// Rows returned when the query gives no limit
    pub default_limit: usize,
    /// Upper clamp for `limit`
    pub max_limit: usize,
}

/// Create history API router
pub fn create_history_router(state: Arc<HistoryAppState>) -> Router {
    Router::new()
        .route("/api/history", get(get_history))
        .with_state(state)
}

/// GET /api/history?entityId=X&property=P&startTime=T&endTime=T&limit=N
///
/// Serves the bounded per-property history of the live collection, newest
/// first. Only the last ten changes of each property are retained.
async fn get_history(
    State(state): State<Arc<HistoryAppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, QueryError> {
    let entity_id = params
        .entity_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| QueryError::BadRequest("entityId parameter is required".to_string()))?;

    let start = parse_bound(params.start_time.as_deref(), "startTime")?;
    let end = parse_bound(params.end_time.as_deref(), "endTime")?;

    let limit = params
        .limit
        .unwrap_or(state.default_limit)
        .clamp(1, state.max_limit.max(1));

    let entity = state
        .state_engine
        .get_entity(entity_id)
        .ok_or(QueryError::NotFound("Entity not found"))?;

    let id = entity.id.as_str();
    let mut entries: Vec<(Option<DateTime<Utc>>, HistoryEntry)> = entity
        .properties
        .values()
        .filter(|p| params.property.as_deref().map_or(true, |wanted| p.name == wanted))
        .flat_map(|p| {
            p.history.iter().map(move |change| HistoryEntry {
                entity_id: id.to_string(),
                property: p.name.clone(),
                change: change.clone(),
            })
        })
        .map(|entry| (parse_timestamp(&entry.change.timestamp), entry))
        .filter(|(at, _)| within(*at, start, end))
        .collect();

    entries.sort_by(|(a, x), (b, y)| {
        newest_first(*a, *b).then_with(|| x.property.cmp(&y.property))
    });
    entries.truncate(limit);

    Ok(Json(entries.into_iter().map(|(_, entry)| entry).collect()))
}

fn parse_bound(raw: Option<&str>, name: &str) -> Result<Option<DateTime<Utc>>, QueryError> {
    match raw {
        None => Ok(None),
        Some(text) => parse_timestamp(text).map(Some).ok_or_else(|| {
            QueryError::BadRequest(format!("invalid `{}` timestamp (expected ISO 8601)", name))
        }),
    }
}

/// Inclusive bounds; an unparsable change time only passes when unbounded
fn within(
    at: Option<DateTime<Utc>>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> bool {
    match at {
        Some(at) => start.map_or(true, |s| at >= s) && end.map_or(true, |e| at <= e),
        None => start.is_none() && end.is_none(),
    }
}

/// Descending by time; unparsable times sort last
fn newest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
