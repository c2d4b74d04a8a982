use crate::event::ChangeEvent;
use crate::state::entity::{Entity, EntityMap};

/// Fold a batch of change events into current entity states.
///
/// Entities are created on first sight with the event's type. Events are
/// processed in the given order, which only matters for which changes survive
/// in a property's bounded history; current values and `last_seen` follow
/// timestamps, not arrival order. Pre-sort by timestamp for exact replay.
pub fn reduce(events: &[ChangeEvent]) -> EntityMap {
    let mut entities = EntityMap::new();
    for event in events {
        apply_event(&mut entities, event);
    }
    entities
}

/// Apply one event with bulk-path semantics (no `changes_today` increment).
pub fn apply_event(entities: &mut EntityMap, event: &ChangeEvent) {
    let entity = entities
        .entry(event.entity_id.clone())
        .or_insert_with(|| Entity::new(&event.entity_id, &event.entity_type, &event.timestamp));

    entity.record_change(
        &event.property_name,
        event.value.clone(),
        event.previous_value.clone(),
        &event.timestamp,
    );
    entity.observe(&event.timestamp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PropertyValue;

    fn event(entity: &str, prop: &str, value: PropertyValue, ts: &str) -> ChangeEvent {
        ChangeEvent {
            entity_id: entity.to_string(),
            entity_type: "System".to_string(),
            property_name: prop.to_string(),
            value,
            previous_value: None,
            timestamp: ts.to_string(),
        }
    }

    #[test]
    fn test_empty_batch() {
        assert!(reduce(&[]).is_empty());
    }

    #[test]
    fn test_type_taken_from_first_event() {
        let mut first = event("n-1", "latency", 3.0.into(), "2026-03-01T10:00:00Z");
        first.entity_type = "NetworkNode".to_string();
        let entities = reduce(&[first]);
        assert_eq!(entities["n-1"].entity_type, "NetworkNode");
        assert_eq!(entities["n-1"].changes_today, 0);
    }

    #[test]
    fn test_old_value_falls_back_to_previous_current() {
        let entities = reduce(&[
            event("e", "status", "idle".into(), "2026-03-01T10:00:00Z"),
            event("e", "status", "active".into(), "2026-03-01T10:05:00Z"),
        ]);
        let history: Vec<_> = entities["e"].properties["status"].history.iter().cloned().collect();
        assert_eq!(history[0].old_value, None);
        assert_eq!(history[1].old_value, Some(PropertyValue::from("idle")));
    }

    #[test]
    fn test_invalid_first_timestamp_is_replaced_by_valid() {
        let entities = reduce(&[
            event("e", "cpu", 10.0.into(), "garbage"),
            event("e", "cpu", 20.0.into(), "2026-03-01T09:00:00Z"),
        ]);
        let entity = &entities["e"];
        assert_eq!(entity.last_seen, "2026-03-01T09:00:00Z");
        assert_eq!(entity.properties["cpu"].current_value, PropertyValue::Numeric(20.0));
    }
}
