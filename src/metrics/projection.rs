use crate::event::ChangeEvent;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Current state of one entity as seen by the metrics calculator.
///
/// Built independently of the live reducer so aggregation only depends on
/// the raw change list.
#[derive(Debug)]
pub struct ProjectedEntity<'a> {
    pub entity_type: &'a str,
    properties: HashMap<&'a str, Candidate<'a>>,
}

#[derive(Debug)]
struct Candidate<'a> {
    at: DateTime<Utc>,
    event: &'a ChangeEvent,
}

impl<'a> ProjectedEntity<'a> {
    /// Latest valid event for a property
    pub fn property(&self, name: &str) -> Option<&'a ChangeEvent> {
        self.properties.get(name).map(|c| c.event)
    }

    /// Latest valid event of every property
    pub fn latest_events(&self) -> impl Iterator<Item = &'a ChangeEvent> + '_ {
        self.properties.values().map(|c| c.event)
    }
}

/// Group events by entity and keep, per property, the event with the
/// greatest valid timestamp.
///
/// Ties keep the first seen. Events with invalid timestamps are never
/// candidates, so a property whose events are all invalid is absent. The
/// entity itself is still present, typed by its first event.
pub fn project(events: &[ChangeEvent]) -> HashMap<&str, ProjectedEntity<'_>> {
    let mut entities: HashMap<&str, ProjectedEntity<'_>> = HashMap::new();

    for event in events {
        let entity = entities
            .entry(event.entity_id.as_str())
            .or_insert_with(|| ProjectedEntity {
                entity_type: event.entity_type.as_str(),
                properties: HashMap::new(),
            });

        let Some(at) = event.parsed_timestamp() else {
            continue;
        };

        let newer = match entity.properties.get(event.property_name.as_str()) {
            Some(existing) => at > existing.at,
            None => true,
        };
        if newer {
            entity
                .properties
                .insert(event.property_name.as_str(), Candidate { at, event });
        }
    }

    entities
}
