use std::time::{SystemTime, SystemTimeError};

use serde_json::Value;

use crate::event::Event;

/// Severity of an event: the value at `field` when present, otherwise `default`.
#[inline]
pub fn get_severity(event: &Event, field: &str, default: &str) -> Value {
    if event.includes(field) {
        event.get(field).cloned().unwrap_or(Value::Null)
    } else {
        Value::String(default.to_owned())
    }
}

/// Renders a JSON value the way it is spliced into interpolated strings.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[inline]
pub fn timestamp() -> Result<u64, SystemTimeError> {
    Ok(SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)?
        .as_secs())
}
