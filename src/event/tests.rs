use super::*;
use serde_json::json;

#[test]
fn test_property_value_classified_from_json_type() {
    assert_eq!(PropertyValue::from_json(&json!(42)), Some(PropertyValue::Numeric(42.0)));
    assert_eq!(PropertyValue::from_json(&json!(0.75)), Some(PropertyValue::Numeric(0.75)));
    assert_eq!(
        PropertyValue::from_json(&json!("critical")),
        Some(PropertyValue::Text("critical".to_string()))
    );
    assert_eq!(PropertyValue::from_json(&json!(null)), None);
    assert_eq!(PropertyValue::from_json(&json!([1, 2])), None);
}

#[test]
fn test_numeric_coercion() {
    assert_eq!(PropertyValue::Numeric(3.5).as_number(), Some(3.5));
    assert_eq!(PropertyValue::from("12").as_number(), Some(12.0));
    assert_eq!(PropertyValue::from(" 7.25 ").as_number(), Some(7.25));
    assert_eq!(PropertyValue::from("high").as_number(), None);
    assert_eq!(PropertyValue::from("NaN").as_number(), None);
    assert_eq!(PropertyValue::from("inf").as_number(), None);
}

#[test]
fn test_labels() {
    assert_eq!(PropertyValue::from("active").as_label(), "active");
    assert_eq!(PropertyValue::Numeric(3.0).as_label(), "3");
}

#[test]
fn test_parse_timestamp_variants() {
    let utc = parse_timestamp("2026-03-01T10:00:00Z").unwrap();
    let offset = parse_timestamp("2026-03-01T12:00:00+02:00").unwrap();
    assert_eq!(utc, offset);

    let naive = parse_timestamp("2026-03-01T10:00:00.500").unwrap();
    assert_eq!(naive.timestamp_millis(), utc.timestamp_millis() + 500);

    assert!(parse_timestamp("not-a-date").is_none());
    assert!(parse_timestamp("").is_none());
    assert!(parse_timestamp("2026-13-45T99:00:00Z").is_none());
    assert!(parse_timestamp("2026-02-30").is_none());
}

#[test]
fn test_parse_timestamp_accepts_short_iso_forms() {
    let ten = parse_timestamp("2026-03-10T10:00:00Z").unwrap();

    let midnight = parse_timestamp("2026-03-10").unwrap();
    assert_eq!(midnight.to_rfc3339(), "2026-03-10T00:00:00+00:00");

    assert_eq!(parse_timestamp("2026-03-10T10:00"), Some(ten));
    assert_eq!(parse_timestamp("2026-03-10T10:00Z"), Some(ten));
    assert_eq!(parse_timestamp("2026-03-10T12:00+02:00"), Some(ten));
    assert_eq!(parse_timestamp("2026-03-10T12:00+0200"), Some(ten));
    assert_eq!(parse_timestamp("2026-03-10T10:00:00.000+0000"), Some(ten));
    assert_eq!(parse_timestamp("2026-03-10T05:00:00-0500"), Some(ten));
}

#[test]
fn test_change_event_serde_shape() {
    let raw = json!({
        "entity_id": "entity-1",
        "entity_type": "System",
        "property_name": "cpu_usage",
        "value": 40,
        "previous_value": "idle",
        "timestamp": "2026-03-01T10:00:00Z"
    });

    let event: ChangeEvent = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(event.value, PropertyValue::Numeric(40.0));
    assert_eq!(event.previous_value, Some(PropertyValue::from("idle")));
    assert!(event.parsed_timestamp().is_some());

    let back = serde_json::to_value(&event).unwrap();
    assert_eq!(back["value"], json!(40.0));
    assert_eq!(back["previous_value"], json!("idle"));
}

#[test]
fn test_parse_events_skips_malformed_and_keeps_order() {
    let raw = vec![
        json!({
            "entity_id": "a",
            "entity_type": "System",
            "property_name": "cpu",
            "value": 1,
            "timestamp": "2026-03-01T10:00:00Z"
        }),
        json!({
            "entity_type": "System",
            "property_name": "cpu",
            "value": 2,
            "timestamp": "2026-03-01T10:00:00Z"
        }),
        json!("garbage"),
        json!({
            "entity_id": "b",
            "entity_type": "Threat",
            "property_name": "severity",
            "value": "high",
            "timestamp": "bogus"
        }),
    ];

    let events = parse_events(&raw);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].entity_id, "a");
    assert_eq!(events[1].entity_id, "b");
    // An invalid timestamp is a data-quality fault, not a malformed event
    assert!(events[1].parsed_timestamp().is_none());
}
