use super::*;
use crate::event::{ChangeEvent, PropertyValue};
use std::sync::Arc;
use std::thread;

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

fn delta(entity: &str, prop: &str, value: PropertyValue, ts: &str) -> EntityDelta {
    EntityDelta {
        entity_id: entity.to_string(),
        property: prop.to_string(),
        new_value: value,
        old_value: None,
        timestamp: ts.to_string(),
    }
}

/// All orderings of `items` (Heap's algorithm)
fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    fn heap<T: Clone>(k: usize, items: &mut Vec<T>, out: &mut Vec<Vec<T>>) {
        if k <= 1 {
            out.push(items.clone());
            return;
        }
        heap(k - 1, items, out);
        for i in 0..k - 1 {
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
            heap(k - 1, items, out);
        }
    }
    let mut items = items.to_vec();
    let mut out = Vec::new();
    let n = items.len();
    heap(n, &mut items, &mut out);
    out
}

// ── Bulk reducer ─────────────────────────────────────────────────────────────

#[test]
fn test_out_of_order_arrival_keeps_latest_timestamp() {
    let entities = reduce(&[
        event("entity-1", "cpu_usage", 40.0.into(), "2026-03-01T10:00:00Z"),
        event("entity-1", "cpu_usage", 30.0.into(), "2026-03-01T09:00:00Z"),
    ]);

    let cpu = &entities["entity-1"].properties["cpu_usage"];
    assert_eq!(cpu.current_value, PropertyValue::Numeric(40.0));
    assert_eq!(cpu.last_changed, "2026-03-01T10:00:00Z");
    // Both changes are still recorded, in processing order
    assert_eq!(cpu.history.len(), 2);
    assert_eq!(entities["entity-1"].last_seen, "2026-03-01T10:00:00Z");
}

#[test]
fn test_reduction_is_permutation_invariant() {
    let batch = vec![
        event("e-1", "cpu", 10.0.into(), "2026-03-01T10:00:00Z"),
        event("e-1", "cpu", 20.0.into(), "2026-03-01T11:00:00Z"),
        event("e-1", "status", "idle".into(), "2026-03-01T09:30:00Z"),
        event("e-2", "cpu", 5.0.into(), "2026-03-01T08:00:00Z"),
        event("e-2", "cpu", 7.0.into(), "2026-03-01T07:00:00Z"),
    ];

    let reference = reduce(&batch);
    for ordering in permutations(&batch) {
        let reduced = reduce(&ordering);
        assert_eq!(reduced.len(), reference.len());
        for (id, entity) in &reference {
            let other = &reduced[id];
            assert_eq!(other.last_seen, entity.last_seen);
            for (name, prop) in &entity.properties {
                assert_eq!(other.properties[name].current_value, prop.current_value);
                assert_eq!(other.properties[name].last_changed, prop.last_changed);
            }
        }
    }
}

#[test]
fn test_history_is_bounded_to_last_ten() {
    let events: Vec<ChangeEvent> = (0..25)
        .map(|i| {
            event(
                "e-1",
                "cpu",
                (i as f64).into(),
                &format!("2026-03-01T10:{:02}:00Z", i),
            )
        })
        .collect();

    let entities = reduce(&events);
    let cpu = &entities["e-1"].properties["cpu"];
    assert_eq!(cpu.history.len(), HISTORY_CAP);

    let kept: Vec<PropertyValue> = cpu.history.iter().map(|c| c.new_value.clone()).collect();
    let expected: Vec<PropertyValue> = (15..25).map(|i| PropertyValue::Numeric(i as f64)).collect();
    assert_eq!(kept, expected);
    assert_eq!(cpu.current_value, PropertyValue::Numeric(24.0));
}

#[test]
fn test_invalid_timestamps_do_not_regress_state() {
    let entities = reduce(&[
        event("e-1", "cpu", 10.0.into(), "2026-03-01T10:00:00Z"),
        event("e-1", "cpu", 99.0.into(), "yesterday-ish"),
    ]);

    let entity = &entities["e-1"];
    assert_eq!(entity.last_seen, "2026-03-01T10:00:00Z");
    assert_eq!(entity.properties["cpu"].current_value, PropertyValue::Numeric(10.0));
    assert_eq!(entity.properties["cpu"].history.len(), 2);
}

#[test]
fn test_previous_value_from_event_is_recorded() {
    let mut e = event("e-1", "status", "active".into(), "2026-03-01T10:00:00Z");
    e.previous_value = Some("idle".into());

    let entities = reduce(&[e]);
    let change = entities["e-1"].properties["status"].history.latest().cloned().unwrap();
    assert_eq!(change.old_value, Some(PropertyValue::from("idle")));
    assert_eq!(change.new_value, PropertyValue::from("active"));
}

// ── Push-update merger ───────────────────────────────────────────────────────

#[test]
fn test_delta_for_unknown_entity_leaves_collection_unchanged() {
    let mut entities = reduce(&[event("e-1", "cpu", 10.0.into(), "2026-03-01T10:00:00Z")]);
    let before = entities.clone();

    let outcome = apply_delta(
        &mut entities,
        &delta("ghost-1", "cpu", 50.0.into(), "2026-03-01T11:00:00Z"),
        UnknownEntityPolicy::Drop,
    );

    assert_eq!(outcome, DeltaOutcome::UnknownEntity);
    assert_eq!(entities, before);
}

#[test]
fn test_delta_for_unknown_entity_can_create_when_configured() {
    let mut entities = EntityMap::new();

    let outcome = apply_delta(
        &mut entities,
        &delta("ghost-1", "cpu", 50.0.into(), "2026-03-01T11:00:00Z"),
        UnknownEntityPolicy::Create,
    );

    assert_eq!(outcome, DeltaOutcome::Created);
    let ghost = &entities["ghost-1"];
    assert_eq!(ghost.entity_type, merger::UNKNOWN_ENTITY_TYPE);
    assert_eq!(ghost.changes_today, 1);
    assert_eq!(ghost.properties["cpu"].current_value, PropertyValue::Numeric(50.0));
}

#[test]
fn test_delta_increments_changes_today() {
    let mut entities = reduce(&[event("e-1", "cpu", 10.0.into(), "2026-03-01T10:00:00Z")]);
    assert_eq!(entities["e-1"].changes_today, 0);

    for minute in 1..=3 {
        apply_delta(
            &mut entities,
            &delta("e-1", "cpu", 11.0.into(), &format!("2026-03-01T10:0{}:00Z", minute)),
            UnknownEntityPolicy::Drop,
        );
    }
    assert_eq!(entities["e-1"].changes_today, 3);
}

#[test]
fn test_delta_overwrites_last_seen_without_ordering_guard() {
    // The incremental path does not validate or order last_seen, unlike the
    // bulk reducer. Both a stale and an unparsable timestamp are taken as is.
    let mut entities = reduce(&[event("e-1", "cpu", 10.0.into(), "2026-03-01T10:00:00Z")]);

    apply_delta(
        &mut entities,
        &delta("e-1", "cpu", 5.0.into(), "2026-03-01T08:00:00Z"),
        UnknownEntityPolicy::Drop,
    );
    assert_eq!(entities["e-1"].last_seen, "2026-03-01T08:00:00Z");

    apply_delta(
        &mut entities,
        &delta("e-1", "cpu", 6.0.into(), "garbage"),
        UnknownEntityPolicy::Drop,
    );
    assert_eq!(entities["e-1"].last_seen, "garbage");
}

#[test]
fn test_stale_delta_does_not_replace_current_value() {
    let mut entities = reduce(&[event("e-1", "cpu", 10.0.into(), "2026-03-01T10:00:00Z")]);

    apply_delta(
        &mut entities,
        &delta("e-1", "cpu", 5.0.into(), "2026-03-01T08:00:00Z"),
        UnknownEntityPolicy::Drop,
    );

    let cpu = &entities["e-1"].properties["cpu"];
    assert_eq!(cpu.current_value, PropertyValue::Numeric(10.0));
    assert_eq!(cpu.history.len(), 2);
    assert_eq!(cpu.history.latest().unwrap().old_value, Some(PropertyValue::Numeric(10.0)));
}

// ── Live store ───────────────────────────────────────────────────────────────

#[test]
fn test_engine_load_snapshot_and_read() {
    let engine = StateEngine::default();
    assert!(engine.load_status().loading);

    let count = engine.load_snapshot(vec![
        event("e-1", "cpu", 10.0.into(), "2026-03-01T10:00:00Z"),
        event("e-2", "cpu", 20.0.into(), "2026-03-01T10:00:00Z"),
    ]);

    assert_eq!(count, 2);
    assert!(!engine.load_status().loading);
    assert_eq!(engine.get_all_entities().len(), 2);
    assert_eq!(engine.change_log().len(), 2);
    assert!(engine.get_entity("nonexistent").is_none());
}

#[test]
fn test_engine_snapshots_are_immutable() {
    let engine = StateEngine::default();
    engine.load_snapshot(vec![event("e-1", "cpu", 10.0.into(), "2026-03-01T10:00:00Z")]);

    let before = engine.snapshot();
    engine.apply_delta(&delta("e-1", "cpu", 90.0.into(), "2026-03-01T11:00:00Z"));

    assert_eq!(
        before["e-1"].properties["cpu"].current_value,
        PropertyValue::Numeric(10.0)
    );
    assert_eq!(
        engine.snapshot()["e-1"].properties["cpu"].current_value,
        PropertyValue::Numeric(90.0)
    );
}

#[test]
fn test_engine_delta_extends_change_log_and_refreshes_metrics() {
    let engine = StateEngine::default();
    let mut threat = event("t-1", "threat_score", 0.2.into(), "2026-03-01T10:00:00Z");
    threat.entity_type = "Threat".to_string();
    engine.load_snapshot(vec![threat]);

    let first = engine.metrics();
    let again = engine.metrics();
    assert!(Arc::ptr_eq(&first, &again), "unchanged log must reuse cached metrics");
    assert_eq!(first.threat_score, "0.20");

    engine.apply_delta(&delta("t-1", "threat_score", 0.8.into(), "2026-03-01T11:00:00Z"));

    let log = engine.change_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].entity_type, "Threat");

    let refreshed = engine.metrics();
    assert!(!Arc::ptr_eq(&first, &refreshed));
    assert_eq!(refreshed.threat_score, "0.80");
}

#[test]
fn test_engine_unknown_delta_changes_nothing() {
    let engine = StateEngine::default();
    engine.load_snapshot(vec![event("e-1", "cpu", 10.0.into(), "2026-03-01T10:00:00Z")]);
    let mut rx = engine.subscribe();
    let before = engine.snapshot();

    let outcome = engine.apply_delta(&delta("ghost-1", "cpu", 1.0.into(), "2026-03-01T11:00:00Z"));

    assert_eq!(outcome, DeltaOutcome::UnknownEntity);
    assert!(Arc::ptr_eq(&before, &engine.snapshot()));
    assert_eq!(engine.change_log().len(), 1);
    assert!(rx.try_recv().is_err());
    assert_eq!(engine.stats.snapshot().unknown_entity_deltas, 1);
}

#[test]
fn test_engine_full_list_replaces_collection() {
    let engine = StateEngine::default();
    engine.load_snapshot(vec![event("old", "cpu", 1.0.into(), "2026-03-01T10:00:00Z")]);
    let mut rx = engine.subscribe();

    let replacement = Entity::new("fresh", "User", "2026-03-02T00:00:00Z");
    let count = engine.apply_full_list(vec![replacement]);

    assert_eq!(count, 1);
    assert!(engine.get_entity("old").is_none());
    assert_eq!(engine.get_entity("fresh").unwrap().entity_type, "User");
    assert!(matches!(
        rx.try_recv(),
        Ok(StateUpdate::Replaced { entity_count: 1 })
    ));
}

#[test]
fn test_engine_broadcasts_applied_deltas() {
    let engine = StateEngine::default();
    engine.load_snapshot(vec![event("e-1", "cpu", 10.0.into(), "2026-03-01T10:00:00Z")]);
    let mut rx = engine.subscribe();

    engine.apply_delta(&delta("e-1", "cpu", 12.0.into(), "2026-03-01T10:01:00Z"));

    let update = rx.try_recv().unwrap();
    assert_eq!(update.entity_id(), Some("e-1"));
}

#[test]
fn test_engine_load_error() {
    let engine = StateEngine::default();
    engine.set_load_error("Invalid response from snapshot endpoint".to_string());

    let status = engine.load_status();
    assert!(!status.loading);
    assert_eq!(status.error.as_deref(), Some("Invalid response from snapshot endpoint"));
}

#[test]
fn test_engine_serializes_concurrent_deltas() {
    let engine = Arc::new(StateEngine::default());
    engine.load_snapshot(vec![event("shared", "cpu", 0.0.into(), "2026-03-01T10:00:00Z")]);
    let mut handles = vec![];

    // 10 writers, each applying deltas to its own property of one entity
    for i in 0..10 {
        let engine_clone = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for j in 0..10 {
                engine_clone.apply_delta(&delta(
                    "shared",
                    &format!("prop_{}", i),
                    (j as f64).into(),
                    &format!("2026-03-01T11:{:02}:00Z", j),
                ));
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let entity = engine.get_entity("shared").unwrap();
    assert_eq!(entity.changes_today, 100);
    assert_eq!(entity.properties.len(), 11);
    assert_eq!(engine.change_log().len(), 101);
}

#[test]
fn test_engine_compacts_change_log_without_changing_metrics() {
    let engine = StateEngine::default().with_compaction_threshold(8);
    let mut threat = event("t-1", "threat_score", 0.1.into(), "2020-01-01T00:00:00Z");
    threat.entity_type = "Threat".to_string();
    engine.load_snapshot(vec![threat.clone()]);

    let mut full = vec![threat];
    for minute in 1..=40u32 {
        let d = delta(
            "t-1",
            "threat_score",
            (f64::from(minute) / 100.0).into(),
            &format!("2020-01-01T00:{:02}:00Z", minute),
        );
        engine.apply_delta(&d);
        full.push(d.to_change_event("Threat"));
    }

    let log = engine.change_log();
    assert!(log.len() < 8, "log holds {} events", log.len());
    assert_eq!(log[0].timestamp, "2020-01-01T00:00:00Z");

    let today = chrono::Utc::now().date_naive();
    assert_eq!(*engine.metrics_at(today), crate::metrics::aggregate_at(&full, today));
    assert_eq!(engine.metrics_at(today).threat_score, "0.40");
}

#[test]
fn test_explicit_compaction_keeps_cached_metrics_valid() {
    let engine = StateEngine::default();
    engine.load_snapshot(vec![
        event("e-1", "cpu", 1.0.into(), "2026-03-01T10:00:00Z"),
        event("e-1", "cpu", 2.0.into(), "2026-03-02T10:00:00Z"),
        event("e-1", "cpu", 3.0.into(), "2026-03-09T10:00:00Z"),
    ]);
    let today = chrono::NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
    let before = engine.metrics_at(today);

    assert_eq!(engine.compact_change_log(today), 1);
    assert_eq!(engine.change_log().len(), 2);

    let recomputed = crate::metrics::aggregate_at(&engine.change_log(), today);
    assert_eq!(recomputed, *before);
    assert!(Arc::ptr_eq(&before, &engine.metrics_at(today)));
}
