//! Population-level statistics derived from the raw change list.
//!
//! Everything here is a pure function of its input. Bad data points (invalid
//! timestamps, non-numeric values, missing properties) are excluded from the
//! statistic they would feed; nothing in this module returns an error.

use crate::event::ChangeEvent;
use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

mod compaction;
mod projection;

pub use compaction::compact;
pub use projection::{project, ProjectedEntity};

/// Number of daily buckets in `entity_changes_by_day` (today + 6 prior days)
pub const CHANGE_HISTOGRAM_DAYS: u64 = 7;

const THREAT_TYPE: &str = "Threat";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMetrics {
    pub active_threats: usize,
    /// Mean threat score, two decimals
    pub threat_score: String,
    /// Mean confidence as an integer percentage
    pub ai_confidence: i64,
    pub total_connections: f64,
    pub threat_severity_distribution: BTreeMap<String, u64>,
    pub ai_agent_activity: BTreeMap<String, u64>,
    pub protocol_usage: BTreeMap<String, u64>,
    /// UTC date (`YYYY-MM-DD`) -> change count
    pub entity_changes_by_day: BTreeMap<String, u64>,
}

/// Aggregate the change list with "today" taken from the system clock.
pub fn aggregate(events: &[ChangeEvent]) -> AggregatedMetrics {
    aggregate_at(events, Utc::now().date_naive())
}

/// Aggregate the change list relative to the given UTC date.
pub fn aggregate_at(events: &[ChangeEvent], today: NaiveDate) -> AggregatedMetrics {
    let entities = project(events);

    let active_threats = entities
        .values()
        .filter(|e| e.entity_type == THREAT_TYPE)
        .count();

    let mean_score = mean_of(&entities, "threat_score");
    let threat_score = format!("{:.2}", (mean_score * 100.0).round() / 100.0);
    let ai_confidence = (mean_of(&entities, "confidence_score") * 100.0).round() as i64;

    let total_connections: f64 = entities
        .values()
        .flat_map(|e| {
            ["connection_count", "network_connections"]
                .into_iter()
                .filter_map(move |name| e.property(name))
        })
        .filter_map(|event| event.value.as_number())
        .sum();

    let threat_severity_distribution =
        tally(entities.values().filter_map(|e| e.property("severity")));
    let ai_agent_activity = tally(entities.values().filter_map(|e| e.property("status")));
    let protocol_usage = tally(
        entities
            .values()
            .filter_map(|e| e.property("routing_status").or_else(|| e.property("status"))),
    );

    AggregatedMetrics {
        active_threats,
        threat_score,
        ai_confidence,
        total_connections,
        threat_severity_distribution,
        ai_agent_activity,
        protocol_usage,
        entity_changes_by_day: changes_by_day(events, today),
    }
}

/// Mean of a numeric property over entities that carry it; 0 when none do.
fn mean_of(entities: &HashMap<&str, ProjectedEntity<'_>>, name: &str) -> f64 {
    let values: Vec<f64> = entities
        .values()
        .filter_map(|e| e.property(name))
        .filter_map(|event| event.value.as_number())
        .collect();

    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn tally<'a>(events: impl Iterator<Item = &'a ChangeEvent>) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for event in events {
        *counts.entry(event.value.as_label()).or_insert(0) += 1;
    }
    counts
}

/// Seven pre-seeded daily buckets ending at `today`, counting every event
/// with a valid timestamp on one of those dates.
pub fn changes_by_day(events: &[ChangeEvent], today: NaiveDate) -> BTreeMap<String, u64> {
    let mut buckets: BTreeMap<String, u64> = (0..CHANGE_HISTOGRAM_DAYS)
        .filter_map(|offset| today.checked_sub_days(Days::new(offset)))
        .map(|day| (day_key(day), 0))
        .collect();

    for event in events {
        let Some(at) = event.parsed_timestamp() else {
            continue;
        };
        if let Some(count) = buckets.get_mut(&day_key(at.date_naive())) {
            *count += 1;
        }
    }

    buckets
}

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}
