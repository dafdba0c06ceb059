//! A log-pipeline output for [Google Cloud Logging](https://cloud.google.com/logging).
//!
//! [`StackdriverOutput`] turns each batch of [`Event`]s it receives into a single
//! [entries.write](https://cloud.google.com/logging/docs/reference/v2/rest/v2/entries/write)
//! call against the `global` resource of the configured project.
//!
//! ```no_run
//! use stackdriver_logging_output::{Event, StackdriverConfig, StackdriverOutput};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StackdriverConfig::builder()
//!     .project_id("folkloric-guru-278")
//!     .log_name("%{service}-log")
//!     .strip_at_fields(true)
//!     .build()?;
//!
//! let output = StackdriverOutput::register(config).await?;
//!
//! let event: Event = r#"{"service": "billing", "message": "charged", "severity": "INFO"}"#.parse()?;
//! if let Some(write) = output.multi_receive(&[event]) {
//!     write.await?;
//! }
//! # Ok(())
//! # }
//! ```

mod batcher;
mod config;
mod default_mapper;
mod event;
pub mod gauth;
pub mod google_logger;
mod ingest;
mod log_entry;
mod output;
mod utils;

pub use batcher::{BatchSink, Batcher, BatcherClosed};
pub use config::{
    BatcherConfig, BatcherConfigBuilder, ConfigError, StackdriverConfig,
    StackdriverConfigBuilder, WRITE_URL,
};
pub use default_mapper::{DefaultLogMapper, FieldFilter};
pub use event::{Event, EventError};
pub use ingest::{IngestError, forward_lines};
pub use log_entry::{LogEntry, Resource, ResourceLabels, WriteLogEntriesRequest};
pub use output::{RegisterError, StackdriverOutput};
pub use utils::get_severity;
