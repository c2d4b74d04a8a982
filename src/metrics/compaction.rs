use super::{project, CHANGE_HISTOGRAM_DAYS};
use crate::event::ChangeEvent;
use chrono::{Days, NaiveDate};
use std::collections::HashSet;

/// Drop change events that can no longer influence aggregation.
///
/// An event is kept when any of these holds:
/// - it is the first event of its entity (the entity's type comes from it);
/// - it is the latest valid event of its (entity, property);
/// - its valid timestamp falls on or after the first day of the histogram
///   window ending at `today`.
///
/// Kept events stay in arrival order, so `aggregate_at` gives the same result
/// for the compacted log on `today` or any later day, including after more
/// events are appended.
pub fn compact(events: &[ChangeEvent], today: NaiveDate) -> Vec<ChangeEvent> {
    let window_start = today
        .checked_sub_days(Days::new(CHANGE_HISTOGRAM_DAYS - 1))
        .unwrap_or(NaiveDate::MIN);

    let latest: HashSet<*const ChangeEvent> = project(events)
        .values()
        .flat_map(|entity| entity.latest_events())
        .map(|event| event as *const ChangeEvent)
        .collect();

    let mut seen_entities = HashSet::new();
    events
        .iter()
        .filter(|event| {
            let first_of_entity = seen_entities.insert(event.entity_id.as_str());
            let in_window = event
                .parsed_timestamp()
                .is_some_and(|at| at.date_naive() >= window_start);
            first_of_entity || in_window || latest.contains(&(*event as *const ChangeEvent))
        })
        .cloned()
        .collect()
}
