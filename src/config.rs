use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use derive_builder::{Builder, UninitializedFieldError};
use serde::Deserialize;
use thiserror::Error;

/// Google Cloud Logging API endpoint for writing log entries.
pub const WRITE_URL: &str = "https://logging.googleapis.com/v2/entries:write";

const SEVERITY_FIELD: &str = "severity";
const TIMESTAMP_FIELD: &str = "@timestamp";
const DEFAULT_SEVERITY: &str = "default";

const MAX_BATCH: usize = 10;
const BUFFER_SIZE: usize = 1_000;
const MAX_DELAY: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required option `{0}`")]
    MissingField(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl From<UninitializedFieldError> for ConfigError {
    fn from(err: UninitializedFieldError) -> Self {
        Self::MissingField(err.field_name())
    }
}

impl From<String> for ConfigError {
    fn from(reason: String) -> Self {
        Self::Invalid(reason)
    }
}

/// Options of the Stackdriver output, fixed once the output is registered.
///
/// Built either through [`StackdriverConfigBuilder`] or deserialized from JSON;
/// both paths apply the same defaults and validation.
#[derive(Debug, Clone, PartialEq, Builder, Deserialize)]
#[builder(
    pattern = "owned",
    setter(into, strip_option),
    build_fn(validate = "Self::validate", error = "ConfigError")
)]
#[serde(deny_unknown_fields)]
pub struct StackdriverConfig {
    /// Target project. Discovered from the metadata server when absent.
    #[builder(default)]
    #[serde(default)]
    pub project_id: Option<String>,
    /// Credential file. Application default credentials are used when absent.
    #[builder(default)]
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Log name template, interpolated with event fields.
    pub log_name: String,
    #[builder(default = SEVERITY_FIELD.to_owned())]
    #[serde(default = "default_severity_field")]
    pub severity_field: String,
    #[builder(default = TIMESTAMP_FIELD.to_owned())]
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    #[builder(default = DEFAULT_SEVERITY.to_owned())]
    #[serde(default = "default_severity")]
    pub default_severity: String,
    #[builder(default)]
    #[serde(default)]
    pub strip_at_fields: bool,
    #[builder(default)]
    #[serde(default)]
    pub strip_fields: Vec<String>,
    /// Metadata server host, `GCE_METADATA_HOST` or `169.254.169.254` when absent.
    #[builder(default)]
    #[serde(default)]
    pub metadata_host: Option<String>,
    #[builder(default = WRITE_URL.to_owned())]
    #[serde(default = "default_logging_endpoint")]
    pub logging_endpoint: String,
}

fn default_severity_field() -> String {
    SEVERITY_FIELD.to_owned()
}

fn default_timestamp_field() -> String {
    TIMESTAMP_FIELD.to_owned()
}

fn default_severity() -> String {
    DEFAULT_SEVERITY.to_owned()
}

fn default_logging_endpoint() -> String {
    WRITE_URL.to_owned()
}

fn check_log_name(log_name: &str) -> Result<(), String> {
    if log_name.trim().is_empty() {
        return Err("`log_name` must not be empty".to_owned());
    }
    Ok(())
}

impl StackdriverConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.log_name {
            Some(ref log_name) => check_log_name(log_name),
            None => Ok(()),
        }
    }
}

impl StackdriverConfig {
    pub fn builder() -> StackdriverConfigBuilder {
        StackdriverConfigBuilder::default()
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(bytes)?;
        check_log_name(&config.log_name)?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_json_slice(&bytes)
    }
}

/// Batching of the bundled host loop; the output itself never re-batches.
#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned", setter(into, strip_option))]
pub struct BatcherConfig {
    #[builder(default = MAX_BATCH)]
    pub max_batch: usize,
    #[builder(default = MAX_DELAY)]
    pub max_delay: Duration,
    #[builder(default = BUFFER_SIZE)]
    pub buffer_size: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch: MAX_BATCH,
            max_delay: MAX_DELAY,
            buffer_size: BUFFER_SIZE,
        }
    }
}
