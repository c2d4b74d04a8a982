use crate::feed::{encode_frame, ClientMessage, FeedMessage};
use crate::state::{StateEngine, StateUpdate};
use axum::extract::ws::{Message, WebSocket};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Manages a single renderer WebSocket with an optional entity filter.
///
/// Frames use the same `{type, payload}` protocol as the upstream push
/// channel, so a renderer can consume either one.
pub struct ConnectionManager {
    /// Entity ids this connection is subscribed to; empty means all
    subscriptions: HashSet<String>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: HashSet::new(),
        }
    }

    /// Handle WebSocket connection lifecycle.
    ///
    /// Sends the current collection as an `entity_list` first, then forwards
    /// collection changes until either side closes.
    pub async fn handle(mut self, mut socket: WebSocket, engine: Arc<StateEngine>) {
        // Subscribe before reading the collection so no change slips between
        let mut state_rx = engine.subscribe();
        engine.stats.increment_ws_connection();
        info!("WebSocket connection established");

        if let Err(e) = self.send(&mut socket, &self.entity_list(&engine)).await {
            error!(error = %e, "Failed to send initial entity list");
        } else {
            loop {
                tokio::select! {
                    Some(msg) = socket.recv() => {
                        match msg {
                            Ok(Message::Text(text)) => {
                                if let Err(e) = self.handle_client_message(&text) {
                                    warn!(error = %e, "Ignoring malformed client message");
                                }
                            }
                            Ok(Message::Close(_)) => {
                                info!("WebSocket client disconnected");
                                break;
                            }
                            Ok(Message::Ping(data)) => {
                                if let Err(e) = socket.send(Message::Pong(data)).await {
                                    error!(error = %e, "Failed to send pong");
                                    break;
                                }
                            }
                            Ok(_) => {
                                // Ignore binary, pong messages
                            }
                            Err(e) => {
                                warn!(error = %e, "WebSocket error");
                                break;
                            }
                        }
                    }

                    result = state_rx.recv() => {
                        match result {
                            Ok(update) => {
                                if let Some(frame) = self.frame_for(&update, &engine) {
                                    if let Err(e) = self.send(&mut socket, &frame).await {
                                        error!(error = %e, "Failed to send state update");
                                        break;
                                    }
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                // Resync rather than leave the renderer with gaps
                                warn!(skipped = skipped, "WebSocket lagged, resending entity list");
                                let list = self.entity_list(&engine);
                                if let Err(e) = self.send(&mut socket, &list).await {
                                    error!(error = %e, "Failed to resend entity list");
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                error!("State broadcast channel closed");
                                break;
                            }
                        }
                    }

                    else => {
                        break;
                    }
                }
            }
        }

        engine.stats.decrement_ws_connection();
        info!("WebSocket connection closed");
    }

    /// Handle client message (subscribe/unsubscribe)
    fn handle_client_message(&mut self, text: &str) -> anyhow::Result<()> {
        let msg: ClientMessage = serde_json::from_str(text)?;

        match msg {
            ClientMessage::Subscribe { entity_id } => {
                info!(entity_id = %entity_id, "Client subscribed to entity");
                self.subscriptions.insert(entity_id);
            }
            ClientMessage::Unsubscribe { entity_id } => {
                info!(entity_id = %entity_id, "Client unsubscribed from entity");
                self.subscriptions.remove(&entity_id);
            }
        }

        Ok(())
    }

    fn is_subscribed(&self, entity_id: &str) -> bool {
        self.subscriptions.is_empty() || self.subscriptions.contains(entity_id)
    }

    /// Current collection, restricted to this connection's filter
    fn entity_list(&self, engine: &StateEngine) -> FeedMessage {
        let entities = engine
            .get_all_entities()
            .into_iter()
            .filter(|entity| self.is_subscribed(&entity.id))
            .collect();
        FeedMessage::EntityList { entities }
    }

    /// Frame to send for a collection change, if this connection wants it
    fn frame_for(&self, update: &StateUpdate, engine: &StateEngine) -> Option<FeedMessage> {
        match update {
            StateUpdate::Replaced { entity_count } => {
                debug!(entity_count = entity_count, "Forwarding collection replacement");
                Some(self.entity_list(engine))
            }
            StateUpdate::Changed(delta) if self.is_subscribed(&delta.entity_id) => {
                Some(FeedMessage::EntityUpdate(delta.clone()))
            }
            StateUpdate::Changed(_) => None,
        }
    }

    async fn send(&self, socket: &mut WebSocket, frame: &FeedMessage) -> anyhow::Result<()> {
        let json = encode_frame(frame)?;
        socket.send(Message::Text(json)).await?;
        Ok(())
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeEvent;
    use crate::state::{EntityDelta, UnknownEntityPolicy};

    fn engine() -> StateEngine {
        let engine = StateEngine::new(UnknownEntityPolicy::Drop);
        let events = ["sys-1", "sys-2"]
            .iter()
            .map(|id| ChangeEvent {
                entity_id: id.to_string(),
                entity_type: "System".to_string(),
                property_name: "health".to_string(),
                value: 90.0.into(),
                previous_value: None,
                timestamp: "2026-03-01T10:00:00Z".to_string(),
            })
            .collect();
        engine.load_snapshot(events);
        engine
    }

    fn delta(entity_id: &str) -> StateUpdate {
        StateUpdate::Changed(EntityDelta {
            entity_id: entity_id.to_string(),
            property: "health".to_string(),
            new_value: 50.0.into(),
            old_value: None,
            timestamp: "2026-03-01T11:00:00Z".to_string(),
        })
    }

    #[test]
    fn test_unfiltered_connection_gets_everything() {
        let engine = engine();
        let manager = ConnectionManager::new();

        match manager.entity_list(&engine) {
            FeedMessage::EntityList { entities } => assert_eq!(entities.len(), 2),
            other => panic!("unexpected frame {:?}", other),
        }
        assert!(manager.frame_for(&delta("sys-2"), &engine).is_some());
    }

    #[test]
    fn test_subscription_filters_updates_and_lists() {
        let engine = engine();
        let mut manager = ConnectionManager::new();
        manager
            .handle_client_message(r#"{"type":"subscribe","entity_id":"sys-1"}"#)
            .unwrap();

        assert!(matches!(
            manager.frame_for(&delta("sys-1"), &engine),
            Some(FeedMessage::EntityUpdate(_))
        ));
        assert!(manager.frame_for(&delta("sys-2"), &engine).is_none());

        match manager.frame_for(&StateUpdate::Replaced { entity_count: 2 }, &engine) {
            Some(FeedMessage::EntityList { entities }) => {
                assert_eq!(entities.len(), 1);
                assert_eq!(entities[0].id, "sys-1");
            }
            other => panic!("unexpected frame {:?}", other),
        }

        manager
            .handle_client_message(r#"{"type":"unsubscribe","entity_id":"sys-1"}"#)
            .unwrap();
        assert!(manager.frame_for(&delta("sys-2"), &engine).is_some());
    }

    #[test]
    fn test_malformed_client_message_is_error() {
        let mut manager = ConnectionManager::new();
        assert!(manager.handle_client_message("subscribe me").is_err());
        assert!(manager.handle_client_message(r#"{"type":"ping"}"#).is_err());
    }
}
