use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

mod validation;
#[cfg(test)]
mod tests;

pub use validation::{parse_events, validate_event, ValidationError};

/// ChangeEvent reports that one property of one entity took a new value.
///
/// Events are immutable and may arrive in any order. The timestamp is kept as
/// the producer's raw text so an unparsable value survives round-trips; use
/// [`ChangeEvent::parsed_timestamp`] to get a comparable instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity_id: String,
    pub entity_type: String,
    pub property_name: String,
    pub value: PropertyValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<PropertyValue>,
    /// ISO-8601 producer time (may be invalid)
    pub timestamp: String,
}

impl ChangeEvent {
    /// Parsed event time, or None when the timestamp is not valid ISO-8601.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

/// Property value, classified once at ingestion.
///
/// JSON numbers become `Numeric`, JSON strings become `Text`. Nothing else is
/// accepted as a property value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Numeric(f64),
    Text(String),
}

impl PropertyValue {
    /// Classify a JSON value. Returns None for booleans, nulls, arrays, objects
    /// and numbers that do not fit an f64.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(PropertyValue::Numeric),
            Value::String(s) => Some(PropertyValue::Text(s.clone())),
            _ => None,
        }
    }

    /// Numeric reading of the value.
    ///
    /// Text is coerced (`"42"` → 42.0) after trimming; anything that does not
    /// parse to a finite number yields None.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            PropertyValue::Numeric(n) => *n,
            PropertyValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        n.is_finite().then_some(n)
    }

    /// Category label used by the distribution tallies.
    pub fn as_label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Numeric(n) => write!(f, "{}", n),
            PropertyValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Numeric(n)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

/// Parse an ISO-8601 timestamp into UTC.
///
/// RFC 3339 is tried first, then explicit offsets in basic (`+0000`) or
/// extended (`+00:00`) form, with or without seconds. A trailing `Z` or no
/// offset at all reads as UTC, and a bare date is midnight UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    const OFFSET_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M%z",
        "%Y-%m-%dT%H:%M%:z",
    ];
    const NAIVE_FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = raw.strip_suffix(['Z', 'z']).unwrap_or(raw);
    if let Some(dt) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
    {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
