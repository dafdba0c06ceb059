use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of an [entries.write](https://cloud.google.com/logging/docs/reference/v2/rest/v2/entries/write) call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "logName")]
    pub log_name: String,
    pub severity: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<Value>,
    #[serde(rename = "jsonPayload")]
    pub json_payload: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLabels {
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub labels: ResourceLabels,
    #[serde(rename = "type")]
    pub resource_type: String,
}

impl Resource {
    pub fn new_global(project_id: String) -> Self {
        Resource {
            labels: ResourceLabels { project_id },
            resource_type: "global".to_owned(),
        }
    }
}

/// Request body for a batched write; every entry shares `resource`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteLogEntriesRequest {
    pub entries: Vec<LogEntry>,
    pub resource: Resource,
}
