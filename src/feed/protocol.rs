use crate::state::{Entity, EntityDelta};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Push channel frame, discriminated by `type` with the body under `payload`.
///
/// The same frames are consumed from the upstream feed and produced for
/// renderer WebSockets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum FeedMessage {
    /// Replaces the whole entity collection (cold resync)
    EntityList { entities: Vec<Entity> },
    /// Single-property delta
    EntityUpdate(EntityDelta),
    /// Upstream connection signal; informational only
    ConnectionStatus { status: UpstreamStatus },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamStatus {
    Connected,
    Disconnected,
}

/// Renderer → server: entity filter control
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "subscribe")]
    Subscribe { entity_id: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { entity_id: String },
}

/// Why a frame was dropped
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    /// Not JSON at all
    InvalidJson(String),
    /// JSON, but none of the recognized shapes
    UnrecognizedShape { frame_type: Option<String>, reason: String },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::InvalidJson(e) => write!(f, "frame is not valid JSON: {}", e),
            FrameError::UnrecognizedShape { frame_type, reason } => write!(
                f,
                "unrecognized frame (type {}): {}",
                frame_type.as_deref().unwrap_or("<none>"),
                reason
            ),
        }
    }
}

impl std::error::Error for FrameError {}

/// Parse one text frame.
pub fn parse_frame(text: &str) -> Result<FeedMessage, FrameError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;

    let frame_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .map(|t| t.to_string());

    serde_json::from_value(value).map_err(|e| FrameError::UnrecognizedShape {
        frame_type,
        reason: e.to_string(),
    })
}

/// Serialize a frame for sending
pub fn encode_frame(message: &FeedMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}
