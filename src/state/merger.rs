use crate::event::{ChangeEvent, PropertyValue};
use crate::state::entity::{Entity, EntityMap};
use serde::{Deserialize, Serialize};

/// Entity type given to entities created from an unknown-entity delta
pub const UNKNOWN_ENTITY_TYPE: &str = "Unknown";

/// A single-property update delivered by the push channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDelta {
    pub entity_id: String,
    pub property: String,
    pub new_value: PropertyValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<PropertyValue>,
    pub timestamp: String,
}

impl EntityDelta {
    /// The equivalent change event, for appending to the change log
    pub fn to_change_event(&self, entity_type: &str) -> ChangeEvent {
        ChangeEvent {
            entity_id: self.entity_id.clone(),
            entity_type: entity_type.to_string(),
            property_name: self.property.clone(),
            value: self.new_value.clone(),
            previous_value: self.old_value.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

/// What to do with a delta for an entity id that is not in the collection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownEntityPolicy {
    /// Ignore the delta; the collection is left untouched
    #[default]
    Drop,
    /// Create the entity (type `Unknown`) and apply the delta to it
    Create,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied,
    Created,
    UnknownEntity,
}

/// Apply one push-channel delta to the collection in place.
///
/// Property rules match the bulk reducer. Unlike the bulk path,
/// `changes_today` is incremented and `last_seen` is overwritten with the
/// delta's timestamp unconditionally, with no validity or ordering check.
pub fn apply_delta(
    entities: &mut EntityMap,
    delta: &EntityDelta,
    policy: UnknownEntityPolicy,
) -> DeltaOutcome {
    let mut outcome = DeltaOutcome::Applied;

    if !entities.contains_key(&delta.entity_id) {
        match policy {
            UnknownEntityPolicy::Drop => return DeltaOutcome::UnknownEntity,
            UnknownEntityPolicy::Create => {
                entities.insert(
                    delta.entity_id.clone(),
                    Entity::new(&delta.entity_id, UNKNOWN_ENTITY_TYPE, &delta.timestamp),
                );
                outcome = DeltaOutcome::Created;
            }
        }
    }

    let Some(entity) = entities.get_mut(&delta.entity_id) else {
        return DeltaOutcome::UnknownEntity;
    };

    entity.record_change(
        &delta.property,
        delta.new_value.clone(),
        delta.old_value.clone(),
        &delta.timestamp,
    );
    entity.changes_today += 1;
    entity.last_seen = delta.timestamp.clone();

    outcome
}
