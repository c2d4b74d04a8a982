use crate::event::{parse_timestamp, PropertyValue};
use crate::state::history::{PropertyChange, PropertyHistory};
use crate::state::merger::EntityDelta;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Live entity collection keyed by entity id
pub type EntityMap = HashMap<String, Entity>;

/// A monitored subject (system, AI agent, threat, network node, user)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,

    /// Entity kind, e.g. "Threat", "AIAgent"
    #[serde(rename = "type")]
    pub entity_type: String,

    #[serde(default)]
    pub properties: HashMap<String, PropertyState>,

    /// Raw timestamp of the latest valid observation
    pub last_seen: String,

    /// Deltas applied through the push channel this session
    #[serde(default)]
    pub changes_today: u64,
}

impl Entity {
    /// Empty entity first seen at `timestamp`
    pub fn new(id: &str, entity_type: &str, timestamp: &str) -> Self {
        Self {
            id: id.to_string(),
            entity_type: entity_type.to_string(),
            properties: HashMap::new(),
            last_seen: timestamp.to_string(),
            changes_today: 0,
        }
    }

    /// Record a change for `property`, creating the property on first sight.
    pub fn record_change(
        &mut self,
        property: &str,
        new_value: PropertyValue,
        previous_value: Option<PropertyValue>,
        timestamp: &str,
    ) {
        match self.properties.get_mut(property) {
            Some(state) => state.record_change(new_value, previous_value, timestamp),
            None => {
                let state = PropertyState::first(property, new_value, previous_value, timestamp);
                self.properties.insert(property.to_string(), state);
            }
        }
    }

    /// Advance `last_seen` when `timestamp` is valid and later.
    ///
    /// Returns true if it moved. A stored timestamp that does not parse is
    /// older than any valid one.
    pub fn observe(&mut self, timestamp: &str) -> bool {
        let Some(candidate) = parse_timestamp(timestamp) else {
            return false;
        };
        let advance = match parse_timestamp(&self.last_seen) {
            Some(current) => candidate > current,
            None => true,
        };
        if advance {
            self.last_seen = timestamp.to_string();
        }
        advance
    }
}

/// Current value of one property plus its bounded change log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyState {
    pub name: String,
    pub current_value: PropertyValue,
    pub last_changed: String,
    #[serde(default)]
    pub history: PropertyHistory,
}

impl PropertyState {
    fn first(
        name: &str,
        value: PropertyValue,
        previous_value: Option<PropertyValue>,
        timestamp: &str,
    ) -> Self {
        let mut history = PropertyHistory::new();
        history.push(PropertyChange {
            timestamp: timestamp.to_string(),
            old_value: previous_value,
            new_value: value.clone(),
        });
        Self {
            name: name.to_string(),
            current_value: value,
            last_changed: timestamp.to_string(),
            history,
        }
    }

    /// Append to history; move the current value only if this change is the
    /// latest valid one seen so far.
    fn record_change(
        &mut self,
        new_value: PropertyValue,
        previous_value: Option<PropertyValue>,
        timestamp: &str,
    ) {
        let old_value = previous_value.or_else(|| Some(self.current_value.clone()));
        self.history.push(PropertyChange {
            timestamp: timestamp.to_string(),
            old_value,
            new_value: new_value.clone(),
        });

        if supersedes(timestamp, &self.last_changed) {
            self.current_value = new_value;
            self.last_changed = timestamp.to_string();
        }
    }
}

/// Whether a change at `candidate` replaces one at `current`.
///
/// Valid beats invalid, later beats earlier, equal keeps the first seen. Two
/// invalid timestamps fall back to processing order.
fn supersedes(candidate: &str, current: &str) -> bool {
    match (parse_timestamp(candidate), parse_timestamp(current)) {
        (Some(c), Some(cur)) => c > cur,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => true,
    }
}

/// Notification broadcast after the live collection changes
#[derive(Clone, Debug)]
pub enum StateUpdate {
    /// The whole collection was replaced
    Replaced { entity_count: usize },
    /// One delta was applied
    Changed(EntityDelta),
}

impl StateUpdate {
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            StateUpdate::Replaced { .. } => None,
            StateUpdate::Changed(delta) => Some(&delta.entity_id),
        }
    }
}
