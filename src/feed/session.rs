use crate::feed::protocol::{parse_frame, FeedMessage, UpstreamStatus};
use crate::state::{DeltaOutcome, StateEngine};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Connection state of the upstream push channel.
///
/// `Disconnected -> Connecting -> Connected -> Disconnected`. There is no
/// retry state; reconnecting is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Result of handling one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    FullList { entity_count: usize },
    Delta(DeltaOutcome),
    Status(UpstreamStatus),
    Dropped,
}

/// Transport-independent push channel session.
///
/// Owns the connection state and routes parsed frames to the state engine.
/// Handlers never block and never return errors: a bad frame is logged once
/// and dropped, and the connection state is untouched.
pub struct FeedSession {
    engine: Arc<StateEngine>,
    state: RwLock<ConnectionState>,
    upstream_status: RwLock<Option<UpstreamStatus>>,
}

impl FeedSession {
    pub fn new(engine: Arc<StateEngine>) -> Self {
        Self {
            engine,
            state: RwLock::new(ConnectionState::Disconnected),
            upstream_status: RwLock::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<StateEngine> {
        &self.engine
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap()
    }

    /// Last `connection_status` signal seen, if any
    pub fn upstream_status(&self) -> Option<UpstreamStatus> {
        *self.upstream_status.read().unwrap()
    }

    fn transition(&self, next: ConnectionState) {
        let mut state = self.state.write().unwrap();
        if *state != next {
            debug!(from = ?*state, to = ?next, "Feed connection state change");
            *state = next;
        }
    }

    /// A connection attempt has started
    pub fn begin_connect(&self) {
        self.transition(ConnectionState::Connecting);
    }

    /// The channel opened
    pub fn on_open(&self) {
        info!("Push channel connected");
        self.transition(ConnectionState::Connected);
    }

    /// The channel closed cleanly
    pub fn on_close(&self) {
        info!("Push channel closed");
        self.transition(ConnectionState::Disconnected);
    }

    /// The transport failed
    pub fn on_error(&self, error: &str) {
        warn!(error = %error, "Push channel error");
        self.transition(ConnectionState::Disconnected);
    }

    /// Handle one text frame.
    pub fn on_message(&self, text: &str) -> FrameOutcome {
        self.engine.stats.record_frame();

        let message = match parse_frame(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping push channel frame");
                self.engine.stats.record_dropped();
                return FrameOutcome::Dropped;
            }
        };

        match message {
            FeedMessage::EntityList { entities } => FrameOutcome::FullList {
                entity_count: self.engine.apply_full_list(entities),
            },
            FeedMessage::EntityUpdate(delta) => {
                FrameOutcome::Delta(self.engine.apply_delta(&delta))
            }
            FeedMessage::ConnectionStatus { status } => {
                info!(status = ?status, "Upstream connection status");
                *self.upstream_status.write().unwrap() = Some(status);
                FrameOutcome::Status(status)
            }
        }
    }
}
