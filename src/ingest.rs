use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{
    batcher::{Batcher, BatcherClosed},
    event::Event,
};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Closed(#[from] BatcherClosed),
}

/// Feeds newline-delimited JSON events from `reader` into `batcher` until EOF.
///
/// Blank lines are ignored. Lines that are not a JSON object are logged and skipped.
/// Returns the number of events handed to the batcher.
pub async fn forward_lines<R>(reader: R, batcher: &Batcher) -> Result<usize, IngestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Event>() {
            Ok(event) => {
                batcher.send(event).await?;
                forwarded += 1;
            }
            Err(err) => tracing::warn!("Skipping malformed event: {err}"),
        }
    }

    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use serde_json::json;
    use tokio::task::JoinHandle;
    use tracing_test::traced_test;

    use super::*;
    use crate::{batcher::BatchSink, config::BatcherConfigBuilder};

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<Event>>,
    }

    impl BatchSink for RecordingSink {
        fn multi_receive(&self, events: &[Event]) -> Option<JoinHandle<()>> {
            self.events.lock().unwrap().extend_from_slice(events);
            None
        }
    }

    fn batcher(sink: &Arc<RecordingSink>) -> Batcher {
        let config = BatcherConfigBuilder::default()
            .max_batch(100usize)
            .max_delay(Duration::from_secs(60))
            .build()
            .unwrap();
        Batcher::new(sink.clone(), config)
    }

    #[tokio::test]
    #[traced_test]
    async fn test_skips_blank_and_malformed_lines() {
        let sink = Arc::new(RecordingSink::default());
        let batcher = batcher(&sink);

        let input = concat!(
            "{\"message\": \"first\"}\n",
            "\n",
            "   \n",
            "not json\n",
            "[1, 2]\n",
            "{\"message\": \"second\"}",
        );

        let forwarded = forward_lines(input.as_bytes(), &batcher).await.unwrap();
        batcher.shutdown().await;

        assert_eq!(forwarded, 2);
        let messages: Vec<_> = sink
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.get("message").cloned().unwrap())
            .collect();
        assert_eq!(messages, [json!("first"), json!("second")]);
        assert!(logs_contain("WARN"));
        assert!(logs_contain("Skipping malformed event"));
    }

    #[tokio::test]
    async fn test_pending_events_flush_at_eof() {
        let sink = Arc::new(RecordingSink::default());
        let batcher = batcher(&sink);

        forward_lines(&b"{\"n\": 1}\n{\"n\": 2}\n"[..], &batcher)
            .await
            .unwrap();
        assert!(
            sink.events.lock().unwrap().is_empty(),
            "batch is neither full nor due yet"
        );

        batcher.shutdown().await;
        assert_eq!(sink.events.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_empty_input_forwards_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let batcher = batcher(&sink);

        assert_eq!(forward_lines(&b""[..], &batcher).await.unwrap(), 0);
        batcher.shutdown().await;

        assert!(sink.events.lock().unwrap().is_empty());
        assert!(!logs_contain("Skipping malformed event"));
    }
}
