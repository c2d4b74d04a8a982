// HTTP and WebSocket surfaces for renderers

pub mod history;
pub mod query;
pub mod websocket;

pub use history::{create_history_router, HistoryAppState};
pub use query::{create_query_router, PositionSource, QueryAppState};
pub use websocket::{create_ws_router, ws_handler, WsAppState};

use crate::config::ApiConfig;
use crate::feed::FeedSession;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Request failures shared by the query and history handlers
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    BadRequest(String),
    NotFound(&'static str),
    Internal(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::BadRequest(msg) | QueryError::Internal(msg) => write!(f, "{}", msg),
            QueryError::NotFound(what) => write!(f, "{}", what),
        }
    }
}

impl std::error::Error for QueryError {}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match self {
            QueryError::BadRequest(_) => StatusCode::BAD_REQUEST,
            QueryError::NotFound(_) => StatusCode::NOT_FOUND,
            QueryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

/// All renderer routes merged, with permissive CORS.
///
/// `upstream_metrics` is whatever the bulk snapshot carried; it is reported on
/// `/api/status` and never replaces the locally aggregated metrics.
pub fn create_app(
    session: Arc<FeedSession>,
    positions: PositionSource,
    upstream_metrics: Option<Value>,
    config: &ApiConfig,
) -> Router {
    let state_engine = Arc::clone(session.engine());

    let query_state = Arc::new(QueryAppState {
        state_engine: Arc::clone(&state_engine),
        session,
        positions,
        upstream_metrics,
    });
    let history_state = Arc::new(HistoryAppState {
        state_engine: Arc::clone(&state_engine),
        default_limit: config.history_default_limit,
        max_limit: config.history_max_limit,
    });
    let ws_state = Arc::new(WsAppState { state_engine });

    Router::new()
        .merge(create_query_router(query_state))
        .merge(create_history_router(history_state))
        .merge(create_ws_router(ws_state))
        .layer(CorsLayer::permissive())
}
