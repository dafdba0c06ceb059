use std::{fmt::Write as _, str::FromStr};

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::utils::value_to_string;

/// Field holding the event time, used by `%{+FORMAT}` references.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

#[derive(Error, Debug)]
pub enum EventError {
    #[error("event must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("invalid event JSON: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

/// A single structured record delivered by the pipeline.
///
/// Field order is preserved, so the payload shipped to Cloud Logging lists
/// fields in the order they were produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Returns `true` if the referenced field exists, even when it holds `null`.
    pub fn includes(&self, reference: &str) -> bool {
        self.get(reference).is_some()
    }

    /// Looks up a field by plain name (`message`) or bracketed path (`[http][status]`).
    pub fn get(&self, reference: &str) -> Option<&Value> {
        match parse_path(reference) {
            Some(path) => {
                let (first, rest) = path.split_first()?;
                rest.iter()
                    .try_fold(self.fields.get(*first)?, |value, key| value.get(*key))
            }
            None => self.fields.get(reference),
        }
    }

    #[inline]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    #[inline]
    pub fn to_map(&self) -> Map<String, Value> {
        self.fields.clone()
    }

    /// Interpolates `%{field}` references in `template` with values from this event.
    ///
    /// References that cannot be resolved are kept in the output as written.
    /// `%{+FORMAT}` renders the event's `@timestamp` with a strftime format.
    pub fn sprintf(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("%{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return out;
            };

            let reference = &after[..end];
            let literal = &rest[start..start + 2 + end + 1];

            match self.resolve(reference) {
                Some(value) => out.push_str(&value),
                None => out.push_str(literal),
            }

            rest = &after[end + 1..];
        }

        out.push_str(rest);
        out
    }

    fn resolve(&self, reference: &str) -> Option<String> {
        match reference.strip_prefix('+') {
            Some(format) => self.format_timestamp(format),
            None => self.get(reference).map(value_to_string),
        }
    }

    fn format_timestamp(&self, format: &str) -> Option<String> {
        let raw = self.fields.get(TIMESTAMP_FIELD)?.as_str()?;
        let timestamp = DateTime::parse_from_rfc3339(raw).ok()?;

        let mut out = String::new();
        // chrono reports unknown specifiers as a formatting error.
        write!(out, "{}", timestamp.format(format)).ok()?;
        Some(out)
    }
}

/// Splits `[a][b]` into `["a", "b"]`. Returns `None` for plain field names.
fn parse_path(reference: &str) -> Option<Vec<&str>> {
    if !reference.starts_with('[') {
        return None;
    }

    let mut path = Vec::new();
    let mut rest = reference;
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let end = inner.find(']')?;
        path.push(&inner[..end]);
        rest = &inner[end + 1..];
    }

    Some(path)
}

impl From<Map<String, Value>> for Event {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

impl TryFrom<Value> for Event {
    type Error = EventError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self::new(fields)),
            Value::Null => Err(EventError::NotAnObject("null")),
            Value::Bool(_) => Err(EventError::NotAnObject("a boolean")),
            Value::Number(_) => Err(EventError::NotAnObject("a number")),
            Value::String(_) => Err(EventError::NotAnObject("a string")),
            Value::Array(_) => Err(EventError::NotAnObject("an array")),
        }
    }
}

impl FromStr for Event {
    type Err = EventError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        Self::try_from(serde_json::from_str::<Value>(line)?)
    }
}
