use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use super::event::Event;
use super::gauth::{GAuth, GAuthError};
use super::log_entry::{LogEntry, Resource, WriteLogEntriesRequest};

/// OAuth 2.0 scope for logging write access.
pub const SCOPES: [&str; 1] = ["https://www.googleapis.com/auth/logging.write"];

#[derive(Debug, Clone)]
pub struct LogContext {
    /// The log name template, interpolated per event.
    pub log_name: Arc<str>,
    /// The GCP project ID where logs should be written, if one was resolved.
    pub project_id: Option<Arc<str>>,
}

impl LogContext {
    /// Project segment used in log names and resource labels; empty when unresolved.
    #[inline]
    pub fn project(&self) -> &str {
        self.project_id.as_deref().unwrap_or_default()
    }

    pub fn resource(&self) -> Resource {
        Resource::new_global(self.project().to_owned())
    }
}

/// Trait for mapping an event to an entry compatible with Google Cloud Logging.
///
/// You can implement this to transform log data (e.g., enrich or restructure the payload).
pub trait LogMapper: Send + Sync + 'static {
    /// Converts one event into a log entry using context information.
    fn map(&self, context: &LogContext, event: &Event) -> LogEntry;
}

/// Writes entries to Google Cloud Logging using the [entries.write](https://cloud.google.com/logging/docs/reference/v2/rest/v2/entries/write) API.
#[derive(Debug, Clone)]
pub struct GoogleLogger {
    write_url: Arc<str>,
    gauth: Arc<Mutex<GAuth>>,
    http_client: Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub error: ResponseErrorInner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseErrorInner {
    pub code: Option<i64>,
    pub message: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("ReqwestError: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Google error: {:?}", .0)]
    Response(ResponseErrorInner),
    #[error("unexpected HTTP status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("Service Account: {}", .0)]
    GAuth(#[from] GAuthError),
}

impl GoogleLogger {
    pub fn new(gauth: GAuth, write_url: impl Into<Arc<str>>) -> Self {
        Self {
            write_url: write_url.into(),
            gauth: Arc::new(Mutex::new(gauth)),
            http_client: Client::new(),
        }
    }

    /// Sends one batched write request to Google Cloud Logging.
    pub async fn write_entries(&self, request: &WriteLogEntriesRequest) -> Result<(), LoggerError> {
        let access_token = self.gauth.lock().await.access_token().await?;

        let response = self
            .http_client
            .post(self.write_url.as_ref())
            .header("Authorization", access_token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // https://cloud.google.com/logging/docs/reference/v2/rest/v2/entries/write#response-body
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ResponseError>(&body) {
            Ok(ResponseError { error }) => Err(LoggerError::Response(error)),
            Err(_) => Err(LoggerError::HttpStatus { status, body }),
        }
    }
}
