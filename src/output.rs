use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::{
    config::StackdriverConfig,
    default_mapper::DefaultLogMapper,
    event::Event,
    gauth::{GAuth, GAuthError, MetadataClient},
    google_logger::{GoogleLogger, LogContext, LogMapper, SCOPES},
    log_entry::WriteLogEntriesRequest,
};

#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("unable to load Google Cloud credentials: {0}")]
    Credentials(#[from] GAuthError),
}

/// Output that ships each batch it receives to Google Cloud Logging as one write request.
///
/// Credentials and the project id are resolved once by [`StackdriverOutput::register`]
/// and shared read-only by every batch afterwards.
#[derive(Debug)]
pub struct StackdriverOutput<M: LogMapper = DefaultLogMapper> {
    context: LogContext,
    logger: GoogleLogger,
    mapper: Arc<M>,
}

impl StackdriverOutput<DefaultLogMapper> {
    pub async fn register(config: StackdriverConfig) -> Result<Self, RegisterError> {
        let mapper = DefaultLogMapper::from(&config);
        Self::register_with_mapper(config, mapper).await
    }
}

impl<M: LogMapper> StackdriverOutput<M> {
    /// Loads credentials and resolves the project id.
    ///
    /// A broken `key_file`, or no application default credentials at all, is fatal.
    /// An unresolvable project id is only logged: the output still starts, but the
    /// entries it writes carry an empty project segment.
    pub async fn register_with_mapper(
        config: StackdriverConfig,
        mapper: M,
    ) -> Result<Self, RegisterError> {
        let metadata = MetadataClient::new(config.metadata_host.as_deref());

        let gauth = match config.key_file {
            Some(ref key_file) => GAuth::from_file(key_file, &SCOPES)?,
            None => GAuth::application_default(&metadata, &SCOPES).await?,
        };
        tracing::debug!("Authorized with {} credentials", gauth.kind());

        let project_id = match config.project_id {
            Some(project_id) => Some(project_id),
            None => discover_project_id(&metadata).await,
        };

        let logger = GoogleLogger::new(gauth, config.logging_endpoint);

        Ok(Self::new(config.log_name, project_id, logger, mapper))
    }

    pub fn new(
        log_name: impl Into<Arc<str>>,
        project_id: Option<String>,
        logger: GoogleLogger,
        mapper: M,
    ) -> Self {
        Self {
            context: LogContext {
                log_name: log_name.into(),
                project_id: project_id.map(Arc::from),
            },
            logger,
            mapper: Arc::new(mapper),
        }
    }

    #[inline]
    pub fn project_id(&self) -> Option<&str> {
        self.context.project_id.as_deref()
    }

    /// Maps every event, in order, into a single write request.
    pub fn build_request(&self, events: &[Event]) -> WriteLogEntriesRequest {
        WriteLogEntriesRequest {
            entries: events
                .iter()
                .map(|event| self.mapper.map(&self.context, event))
                .collect(),
            resource: self.context.resource(),
        }
    }

    /// Submits one batch without waiting for the result.
    ///
    /// Returns `None` for an empty batch. Otherwise the write runs on a spawned task
    /// that logs its outcome; failed batches are dropped, never retried. Must be called
    /// from within a tokio runtime.
    pub fn multi_receive(&self, events: &[Event]) -> Option<JoinHandle<()>> {
        if events.is_empty() {
            return None;
        }

        let request = self.build_request(events);
        let logger = self.logger.clone();

        let handle = tokio::spawn(
            async move {
                match logger.write_entries(&request).await {
                    Ok(()) => {
                        tracing::debug!("Wrote {} entries successfully.", request.entries.len())
                    }
                    Err(err) => {
                        tracing::error!("Unable to write log entries to Stackdriver Logging.");
                        tracing::error!("Received this error: {err}");
                    }
                }
            }
            .in_current_span(),
        );

        Some(handle)
    }
}

async fn discover_project_id(metadata: &MetadataClient) -> Option<String> {
    if metadata.on_gce().await {
        match metadata.project_id().await {
            Ok(project_id) => {
                tracing::debug!("Using project id {project_id} from the metadata server");
                return Some(project_id);
            }
            Err(err) => {
                tracing::error!("Unable to read the project ID from the metadata server: {err}")
            }
        }
    } else {
        tracing::error!(
            "Unable to detect the Google Cloud project ID to which logs should be written. \
             Please ensure that you specify the `project_id` config parameter if not running \
             on the Google Cloud Platform."
        );
    }

    tracing::error!("You will not be able to write logs to Google Cloud until this is resolved.");
    None
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use mockito::{Matcher, Mock, Server, ServerGuard};
    use serde_json::{Value, json};
    use tempfile::NamedTempFile;
    use tracing_test::traced_test;

    use super::*;
    use crate::config::StackdriverConfigBuilder;

    fn key_file(server: &ServerGuard) -> NamedTempFile {
        let mut key: Value = serde_json::from_slice(
            &std::fs::read("test_fixtures/service-account-key.json").unwrap(),
        )
        .unwrap();
        key["token_uri"] = json!(format!("{}/token", server.url()));

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(key.to_string().as_bytes()).unwrap();
        file
    }

    fn base_config(server: &ServerGuard, key: &NamedTempFile) -> StackdriverConfigBuilder {
        StackdriverConfig::builder()
            .log_name("app-log")
            .key_file(key.path())
            .metadata_host(server.host_with_port())
            .logging_endpoint(format!("{}/v2/entries:write", server.url()))
    }

    async fn mock_token(server: &mut ServerGuard) -> Mock {
        server
            .mock("POST", "/token")
            .with_body(r#"{"access_token": "ya29.test", "expires_in": 3600}"#)
            .create_async()
            .await
    }

    fn events(values: Vec<Value>) -> Vec<Event> {
        values
            .into_iter()
            .map(|value| Event::try_from(value).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_build_request_preserves_order() {
        let server = Server::new_async().await;
        let key = key_file(&server);
        let config = base_config(&server, &key).project_id("p1").build().unwrap();
        let output = StackdriverOutput::register(config).await.unwrap();

        let batch = events(vec![
            json!({"message": "first", "severity": "INFO"}),
            json!({"message": "second"}),
            json!({"message": "third", "severity": "ERROR"}),
        ]);
        let request = output.build_request(&batch);

        assert_eq!(request.entries.len(), 3);
        let messages: Vec<_> = request
            .entries
            .iter()
            .map(|entry| entry.json_payload["message"].clone())
            .collect();
        assert_eq!(messages, [json!("first"), json!("second"), json!("third")]);
        let severities: Vec<_> = request.entries.iter().map(|e| e.severity.clone()).collect();
        assert_eq!(severities, [json!("INFO"), json!("default"), json!("ERROR")]);
        assert!(
            request
                .entries
                .iter()
                .all(|entry| entry.log_name == "projects/p1/logs/app-log")
        );
        assert_eq!(
            serde_json::to_value(&request.resource).unwrap(),
            json!({"type": "global", "labels": {"project_id": "p1"}})
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_empty_batch_is_ignored() {
        let mut server = Server::new_async().await;
        let key = key_file(&server);
        let write = server
            .mock("POST", "/v2/entries:write")
            .expect(0)
            .create_async()
            .await;
        let config = base_config(&server, &key).project_id("p1").build().unwrap();
        let output = StackdriverOutput::register(config).await.unwrap();

        assert!(output.multi_receive(&[]).is_none());
        write.assert_async().await;
        assert!(!logs_contain("entries successfully"));
        assert!(!logs_contain("Unable to write log entries"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_multi_receive_writes_batch() {
        let mut server = Server::new_async().await;
        let key = key_file(&server);
        let _token = mock_token(&mut server).await;
        let write = server
            .mock("POST", "/v2/entries:write")
            .match_header("authorization", "Bearer ya29.test")
            .match_body(Matcher::Json(json!({
                "entries": [
                    {
                        "logName": "projects/p1/logs/app-log",
                        "severity": "ERROR",
                        "timestamp": "2023-01-01T00:00:00Z",
                        "jsonPayload": {"message": "hi", "severity": "ERROR"},
                    },
                    {
                        "logName": "projects/p1/logs/app-log",
                        "severity": "default",
                        "jsonPayload": {"message": "bye"},
                    },
                ],
                "resource": {"type": "global", "labels": {"project_id": "p1"}},
            })))
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let config = base_config(&server, &key)
            .project_id("p1")
            .strip_at_fields(true)
            .build()
            .unwrap();
        let output = StackdriverOutput::register(config).await.unwrap();

        let batch = events(vec![
            json!({"@timestamp": "2023-01-01T00:00:00Z", "message": "hi", "severity": "ERROR"}),
            json!({"message": "bye"}),
        ]);
        output.multi_receive(&batch).unwrap().await.unwrap();

        write.assert_async().await;
        assert!(logs_contain("Wrote 2 entries successfully."));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_batch_is_logged_and_dropped() {
        let mut server = Server::new_async().await;
        let key = key_file(&server);
        let _token = mock_token(&mut server).await;
        let write = server
            .mock("POST", "/v2/entries:write")
            .with_status(400)
            .with_body(
                r#"{"error": {"code": 400, "message": "Invalid log name", "status": "INVALID_ARGUMENT"}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let config = base_config(&server, &key).project_id("p1").build().unwrap();
        let output = StackdriverOutput::register(config).await.unwrap();

        output
            .multi_receive(&events(vec![json!({"message": "hi"})]))
            .unwrap()
            .await
            .unwrap();

        write.assert_async().await;
        assert!(logs_contain("Unable to write log entries to Stackdriver Logging."));
        assert!(logs_contain("Invalid log name"));
        assert!(!logs_contain("entries successfully"));
    }

    #[tokio::test]
    async fn test_register_discovers_project_on_gce() {
        let mut server = Server::new_async().await;
        let key = key_file(&server);
        let _probe = server
            .mock("GET", "/")
            .with_header("Metadata-Flavor", "Google")
            .create_async()
            .await;
        let _project = server
            .mock("GET", "/computeMetadata/v1/project/project-id")
            .match_header("Metadata-Flavor", "Google")
            .with_body("gce-project\n")
            .create_async()
            .await;

        let config = base_config(&server, &key).build().unwrap();
        let output = StackdriverOutput::register(config).await.unwrap();

        assert_eq!(output.project_id(), Some("gce-project"));

        let request = output.build_request(&events(vec![json!({"message": "hi"})]));
        assert_eq!(request.entries[0].log_name, "projects/gce-project/logs/app-log");
        assert_eq!(request.resource.labels.project_id, "gce-project");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_register_without_project_still_starts() {
        let mut server = Server::new_async().await;
        let key = key_file(&server);
        let _probe = server.mock("GET", "/").create_async().await;

        let config = base_config(&server, &key).build().unwrap();
        let output = StackdriverOutput::register(config).await.unwrap();

        assert_eq!(output.project_id(), None);
        assert!(logs_contain("Unable to detect the Google Cloud project ID"));

        let request = output.build_request(&events(vec![json!({"message": "hi"})]));
        assert_eq!(request.entries[0].log_name, "projects//logs/app-log");
        assert_eq!(request.resource.labels.project_id, "");
    }

    #[tokio::test]
    async fn test_register_fails_on_missing_key_file() {
        let config = StackdriverConfig::builder()
            .log_name("app-log")
            .project_id("p1")
            .key_file("test_fixtures/missing.json")
            .build()
            .unwrap();

        let err = StackdriverOutput::register(config).await.unwrap_err();
        assert!(matches!(err, RegisterError::Credentials(GAuthError::ReadKey(_))));
    }

    #[tokio::test]
    async fn test_register_fails_on_malformed_key_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{\"type\": \"service_account\"").unwrap();
        let config = StackdriverConfig::builder()
            .log_name("app-log")
            .project_id("p1")
            .key_file(file.path())
            .build()
            .unwrap();

        let err = StackdriverOutput::register(config).await.unwrap_err();
        assert!(matches!(err, RegisterError::Credentials(GAuthError::SerdeJson(_))));
    }
}
