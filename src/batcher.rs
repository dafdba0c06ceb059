use std::{pin::Pin, sync::Arc};

use thiserror::Error;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Sleep, sleep},
};

use crate::{
    config::BatcherConfig, event::Event, google_logger::LogMapper, output::StackdriverOutput,
};

/// Anything that accepts whole batches of events.
pub trait BatchSink: Send + Sync + 'static {
    /// Hands one batch over; the returned task, if any, completes when the batch is settled.
    fn multi_receive(&self, events: &[Event]) -> Option<JoinHandle<()>>;
}

impl<M: LogMapper> BatchSink for StackdriverOutput<M> {
    fn multi_receive(&self, events: &[Event]) -> Option<JoinHandle<()>> {
        StackdriverOutput::multi_receive(self, events)
    }
}

#[derive(Error, Debug)]
#[error("batcher is shut down, event dropped")]
pub struct BatcherClosed;

/// Groups single events into batches for a [`BatchSink`], one batch at a time.
///
/// A batch is handed over once `max_batch` events are buffered or `max_delay`
/// has passed since its first event.
pub struct Batcher {
    sender: mpsc::Sender<Event>,
    handle: JoinHandle<()>,
}

impl Batcher {
    pub fn new<S: BatchSink>(sink: Arc<S>, config: BatcherConfig) -> Self {
        let (tx, rx) = mpsc::channel::<Event>(config.buffer_size.max(1));
        let handle = tokio::spawn(Self::run_batch_loop(rx, config, sink));

        Self { sender: tx, handle }
    }

    /// Queues an event, waiting while the buffer is full.
    pub async fn send(&self, event: Event) -> Result<(), BatcherClosed> {
        self.sender.send(event).await.map_err(|_| BatcherClosed)
    }

    /// Flushes what is buffered and waits for every submitted batch to settle.
    pub async fn shutdown(self) {
        drop(self.sender);

        if let Err(err) = self.handle.await {
            tracing::error!("Batch loop panicked: {:?}", err);
        }
    }

    async fn run_batch_loop<S: BatchSink>(
        mut receiver: mpsc::Receiver<Event>,
        config: BatcherConfig,
        sink: Arc<S>,
    ) {
        let max_batch = config.max_batch.max(1);
        let mut buffer = Vec::with_capacity(max_batch);
        let mut flush_deadline: Option<Pin<Box<Sleep>>> = None;
        let mut in_flight = Vec::new();

        loop {
            tokio::select! {
                maybe_event = receiver.recv() => {
                    let Some(event) = maybe_event else {
                        break;
                    };

                    buffer.push(event);

                    if flush_deadline.is_none() {
                        flush_deadline = Some(Box::pin(sleep(config.max_delay)));
                    }

                    if buffer.len() >= max_batch {
                        Self::flush_batch(&*sink, std::mem::take(&mut buffer), &mut in_flight);
                        flush_deadline = None;
                    }
                }

                _ = wait_deadline(&mut flush_deadline) => {
                    if !buffer.is_empty() {
                        Self::flush_batch(&*sink, std::mem::take(&mut buffer), &mut in_flight);
                    }
                    flush_deadline = None;
                }
            }
        }

        if !buffer.is_empty() {
            Self::flush_batch(&*sink, buffer, &mut in_flight);
        }

        for handle in in_flight {
            if let Err(err) = handle.await {
                tracing::error!("Batch submission panicked: {:?}", err);
            }
        }

        tracing::debug!("Batch loop shut down cleanly.");
    }

    fn flush_batch<S: BatchSink>(
        sink: &S,
        batch: Vec<Event>,
        in_flight: &mut Vec<JoinHandle<()>>,
    ) {
        in_flight.retain(|handle| !handle.is_finished());

        if let Some(handle) = sink.multi_receive(&batch) {
            in_flight.push(handle);
        }
    }
}

async fn wait_deadline(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}
