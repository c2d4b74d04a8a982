use super::{ChangeEvent, PropertyValue};
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Reasons a raw record cannot become a ChangeEvent
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    NotAnObject,
    MissingField(&'static str),
    EmptyField(&'static str),
    InvalidValue(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NotAnObject => write!(f, "change event must be a JSON object"),
            ValidationError::MissingField(name) => write!(f, "{} is required", name),
            ValidationError::EmptyField(name) => write!(f, "{} must not be empty", name),
            ValidationError::InvalidValue(name) => {
                write!(f, "{} must be a number or a string", name)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates a raw JSON record and builds a ChangeEvent from it.
///
/// Rules:
/// - entity_id, entity_type, property_name: required non-empty strings
/// - value: required, number or string
/// - previous_value: optional; null is treated as absent
/// - timestamp: required string; its content is NOT validated here, since
///   invalid timestamps are a data-quality fault handled downstream
pub fn validate_event(raw: &Value) -> Result<ChangeEvent, ValidationError> {
    let obj = raw.as_object().ok_or(ValidationError::NotAnObject)?;

    let text_field = |name: &'static str| -> Result<String, ValidationError> {
        let s = obj
            .get(name)
            .and_then(|v| v.as_str())
            .ok_or(ValidationError::MissingField(name))?;
        if s.trim().is_empty() {
            return Err(ValidationError::EmptyField(name));
        }
        Ok(s.to_string())
    };

    let entity_id = text_field("entity_id")?;
    let entity_type = text_field("entity_type")?;
    let property_name = text_field("property_name")?;

    let value = obj
        .get("value")
        .ok_or(ValidationError::MissingField("value"))?;
    let value = PropertyValue::from_json(value).ok_or(ValidationError::InvalidValue("value"))?;

    let previous_value = match obj.get("previous_value") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            PropertyValue::from_json(v).ok_or(ValidationError::InvalidValue("previous_value"))?,
        ),
    };

    let timestamp = obj
        .get("timestamp")
        .and_then(|v| v.as_str())
        .ok_or(ValidationError::MissingField("timestamp"))?
        .to_string();

    Ok(ChangeEvent {
        entity_id,
        entity_type,
        property_name,
        value,
        previous_value,
        timestamp,
    })
}

/// Validates a batch of raw records, skipping malformed ones.
///
/// Each skipped record is logged with its position in the batch.
pub fn parse_events(raw: &[Value]) -> Vec<ChangeEvent> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, record)| match validate_event(record) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(index = index, error = %e, "Malformed change event, skipping");
                None
            }
        })
        .collect()
}
