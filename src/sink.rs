//! The output sink capability set and its stream-backed implementations.
//!
//! Everything that consumes orchestration output — the live response
//! stream, the [`ResultCollector`](crate::ResultCollector), and the
//! [`StreamMultiplexer`](crate::StreamMultiplexer) — implements
//! [`EventSink`]. Producers write chunks, statuses, and results, then
//! signal end-of-stream exactly once.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::event::{ChunkEvent, ResultEvent, StatusEvent, StreamEvent};

/// The capability contract every output stream satisfies.
///
/// Implementations take `&self`; shared sinks use interior mutability so
/// one sink instance can be handed to several writers over a request's
/// lifetime.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Write one raw chunk.
    async fn write_chunk(&self, chunk: ChunkEvent) -> Result<()>;

    /// Write one status update.
    async fn write_status(&self, status: StatusEvent) -> Result<()>;

    /// Write one labelled result.
    async fn write_result(&self, result: ResultEvent) -> Result<()>;

    /// Signal end-of-stream.
    async fn end(&self) -> Result<()>;
}

// Shared sinks are passed around as Arc handles; delegate so an
// Arc<dyn EventSink> is itself a sink.
#[async_trait]
impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    async fn write_chunk(&self, chunk: ChunkEvent) -> Result<()> {
        (**self).write_chunk(chunk).await
    }

    async fn write_status(&self, status: StatusEvent) -> Result<()> {
        (**self).write_status(status).await
    }

    async fn write_result(&self, result: ResultEvent) -> Result<()> {
        (**self).write_result(result).await
    }

    async fn end(&self) -> Result<()> {
        (**self).end().await
    }
}

/// A sink that feeds a bounded event channel.
///
/// This is the bridge between an LLM invocation and the multiplexer: the
/// invocation writes into a `ChannelSink` while the multiplexer drains the
/// receiving half as one registered source.
///
/// Writing after the consumer is gone yields [`Error::StreamClosed`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    /// Wrap an existing sender.
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver that drains it.
    pub fn pair(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    async fn forward(&self, event: StreamEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| Error::StreamClosed)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn write_chunk(&self, chunk: ChunkEvent) -> Result<()> {
        self.forward(StreamEvent::Chunk(chunk)).await
    }

    async fn write_status(&self, status: StatusEvent) -> Result<()> {
        self.forward(StreamEvent::Status(status)).await
    }

    async fn write_result(&self, result: ResultEvent) -> Result<()> {
        self.forward(StreamEvent::Result(result)).await
    }

    async fn end(&self) -> Result<()> {
        self.forward(StreamEvent::End).await
    }
}

/// A sink that records every event in memory, in arrival order.
///
/// Useful as a test double and for callers that want to inspect a full
/// event sequence after the fact.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<StreamEvent>>,
}

impl MemorySink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event recorded so far.
    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().unwrap().clone()
    }

    /// The recorded status events, in order.
    pub fn statuses(&self) -> Vec<StatusEvent> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                StreamEvent::Status(status) => Some(status),
                _ => None,
            })
            .collect()
    }

    /// The recorded result events, in order.
    pub fn results(&self) -> Vec<ResultEvent> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                StreamEvent::Result(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    /// Whether end-of-stream has been recorded.
    pub fn is_ended(&self) -> bool {
        self.events.lock().unwrap().iter().any(StreamEvent::is_end)
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn write_chunk(&self, chunk: ChunkEvent) -> Result<()> {
        self.events.lock().unwrap().push(StreamEvent::Chunk(chunk));
        Ok(())
    }

    async fn write_status(&self, status: StatusEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(StreamEvent::Status(status));
        Ok(())
    }

    async fn write_result(&self, result: ResultEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(StreamEvent::Result(result));
        Ok(())
    }

    async fn end(&self) -> Result<()> {
        self.events.lock().unwrap().push(StreamEvent::End);
        Ok(())
    }
}
