use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the push channel and the renderer WebSocket surface
#[derive(Clone, Default)]
pub struct FeedStats {
    /// Frames received from the upstream push channel
    frames_received: Arc<AtomicU64>,

    /// Frames dropped (unparsable or unrecognized shape)
    frames_dropped: Arc<AtomicU64>,

    /// Deltas applied to the live collection
    deltas_applied: Arc<AtomicU64>,

    /// Deltas ignored because the entity was unknown
    unknown_entity_deltas: Arc<AtomicU64>,

    /// Connected renderer WebSockets
    websocket_connections: Arc<AtomicU64>,
}

impl FeedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delta(&self) {
        self.deltas_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_entity(&self) {
        self.unknown_entity_deltas.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ws_connection(&self) {
        self.websocket_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_ws_connection(&self) {
        self.websocket_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            deltas_applied: self.deltas_applied.load(Ordering::Relaxed),
            unknown_entity_deltas: self.unknown_entity_deltas.load(Ordering::Relaxed),
            websocket_connections: self.websocket_connections.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatsSnapshot {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub deltas_applied: u64,
    pub unknown_entity_deltas: u64,
    pub websocket_connections: u64,
}
