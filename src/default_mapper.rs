use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::{
    config::StackdriverConfig,
    event::Event,
    get_severity,
    google_logger::{LogContext, LogMapper},
    log_entry::LogEntry,
};

/// Removes fields from the payload right before it is shipped.
#[derive(Debug, Clone, Default)]
pub struct FieldFilter {
    strip_at_fields: bool,
    strip_fields: HashSet<String>,
}

impl FieldFilter {
    pub fn new(strip_at_fields: bool, strip_fields: impl IntoIterator<Item = String>) -> Self {
        Self {
            strip_at_fields,
            strip_fields: strip_fields.into_iter().collect(),
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.strip_at_fields || !self.strip_fields.is_empty()
    }

    fn drops(&self, key: &str) -> bool {
        (self.strip_at_fields && key.starts_with('@')) || self.strip_fields.contains(key)
    }

    /// Returns a copy of the top-level fields that survive the filter, in order.
    pub fn apply(&self, fields: &Map<String, Value>) -> Map<String, Value> {
        if !self.is_active() {
            return fields.clone();
        }

        fields
            .iter()
            .filter(|(key, _)| !self.drops(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Builds entries the way the Stackdriver output is configured to.
#[derive(Debug, Clone)]
pub struct DefaultLogMapper {
    severity_field: String,
    timestamp_field: String,
    default_severity: String,
    filter: FieldFilter,
}

impl Default for DefaultLogMapper {
    fn default() -> Self {
        Self {
            severity_field: "severity".to_owned(),
            timestamp_field: "@timestamp".to_owned(),
            default_severity: "default".to_owned(),
            filter: FieldFilter::default(),
        }
    }
}

impl From<&StackdriverConfig> for DefaultLogMapper {
    fn from(config: &StackdriverConfig) -> Self {
        Self {
            severity_field: config.severity_field.clone(),
            timestamp_field: config.timestamp_field.clone(),
            default_severity: config.default_severity.clone(),
            filter: FieldFilter::new(config.strip_at_fields, config.strip_fields.iter().cloned()),
        }
    }
}

impl LogMapper for DefaultLogMapper {
    fn map(&self, context: &LogContext, event: &Event) -> LogEntry {
        let log_name = format!(
            "projects/{}/logs/{}",
            context.project(),
            event.sprintf(&context.log_name)
        );

        LogEntry {
            log_name,
            severity: get_severity(event, &self.severity_field, &self.default_severity),
            timestamp: event.get(&self.timestamp_field).cloned(),
            json_payload: self.filter.apply(event.fields()),
        }
    }
}
