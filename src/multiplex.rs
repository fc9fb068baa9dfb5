//! Fan-in of independently-streaming sources into one output stream.
//!
//! The multiplexer lets several LLM invocations (one per context, in the
//! fan-out path) appear to the client as a single ongoing stream. Each
//! registered source is drained by its own task and forwarded to the
//! shared consumer; per-source ordering is preserved, interleaving across
//! sources is whatever the sources produce.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::error::Result;
use crate::event::{ChunkEvent, ResultEvent, StatusEvent, StreamEvent};
use crate::sink::EventSink;

/// Per-source event rewrite applied before forwarding.
///
/// Typically [`StreamEvent::tag_source`] partially applied with the
/// source's id, so provider events carry their origin downstream.
pub type EventTransform = Arc<dyn Fn(StreamEvent) -> StreamEvent + Send + Sync>;

/// One source's terminal error, kept for post-hoc inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub message: String,
}

/// Fuses N named sub-streams into one ordered output stream.
///
/// Sources may be registered at any time, including while a
/// [`wait_for_all_sources`](StreamMultiplexer::wait_for_all_sources) barrier is
/// already pending; the barrier then covers the newcomer too. A source is
/// finished once it yields an end event, reports an error, or its stream
/// closes. Source end events are consumed by the multiplexer — the
/// consumer's stream is ended exactly once, by whoever owns the
/// multiplexer, via [`EventSink::end`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use llm_conduit::{ChannelSink, ChunkEvent, StreamEvent, StreamMultiplexer};
///
/// tokio_test::block_on(async {
///     let (sink, mut rx) = ChannelSink::pair(16);
///     let mux = StreamMultiplexer::new(Arc::new(sink));
///
///     let (tx, source) = tokio::sync::mpsc::channel(4);
///     mux.add_channel(source, "ctx-1", None);
///     tx.send(StreamEvent::Chunk(ChunkEvent::new("hello")))
///         .await
///         .unwrap();
///     tx.send(StreamEvent::End).await.unwrap();
///
///     mux.wait_for_all_sources().await;
///     assert!(matches!(rx.recv().await, Some(StreamEvent::Chunk(_))));
/// });
/// ```
#[derive(Clone)]
pub struct StreamMultiplexer {
    consumer: Arc<dyn EventSink>,
    live: Arc<watch::Sender<usize>>,
    failures: Arc<Mutex<Vec<SourceFailure>>>,
}

impl StreamMultiplexer {
    /// Create a multiplexer forwarding into `consumer`.
    pub fn new(consumer: Arc<dyn EventSink>) -> Self {
        let (live, _) = watch::channel(0);
        Self {
            consumer,
            live: Arc::new(live),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a new source stream under `source_id`.
    ///
    /// The stream is drained concurrently from the moment of registration.
    /// `transform` is applied to every event before forwarding.
    pub fn add_source<S>(
        &self,
        stream: S,
        source_id: impl Into<String>,
        transform: Option<EventTransform>,
    ) where
        S: Stream<Item = StreamEvent> + Send + Unpin + 'static,
    {
        let source_id = source_id.into();
        debug!(source = %source_id, "registering multiplex source");

        self.live.send_modify(|count| *count += 1);

        let consumer = Arc::clone(&self.consumer);
        let live = Arc::clone(&self.live);
        let failures = Arc::clone(&self.failures);
        tokio::spawn(async move {
            drain_source(stream, &source_id, transform, consumer.as_ref(), &failures).await;
            live.send_modify(|count| *count = count.saturating_sub(1));
        });
    }

    /// Register a channel-backed source, the usual bridge from a
    /// [`ChannelSink`](crate::ChannelSink)-driven invocation.
    pub fn add_channel(
        &self,
        receiver: mpsc::Receiver<StreamEvent>,
        source_id: impl Into<String>,
        transform: Option<EventTransform>,
    ) {
        self.add_source(ReceiverStream::new(receiver), source_id, transform);
    }

    /// Suspend until every registered source has finished.
    ///
    /// Resolves immediately when no sources are live. A source registered
    /// while the wait is pending extends it: the barrier is quiescence of
    /// the source set, not a snapshot taken at call time.
    pub async fn wait_for_all_sources(&self) {
        let mut live = self.live.subscribe();
        // Sender outlives the borrow of self, so the channel cannot close
        // mid-wait.
        let _ = live.wait_for(|count| *count == 0).await;
    }

    /// Number of currently-live sources.
    pub fn source_count(&self) -> usize {
        *self.live.borrow()
    }

    /// Terminal errors reported by sources so far.
    pub fn failures(&self) -> Vec<SourceFailure> {
        self.failures.lock().unwrap().clone()
    }
}

async fn drain_source<S>(
    mut stream: S,
    source_id: &str,
    transform: Option<EventTransform>,
    consumer: &dyn EventSink,
    failures: &Mutex<Vec<SourceFailure>>,
) where
    S: Stream<Item = StreamEvent> + Send + Unpin,
{
    while let Some(event) = stream.next().await {
        let event = match &transform {
            Some(transform) => transform(event),
            None => event,
        };

        let forwarded = match event {
            StreamEvent::End => {
                debug!(source = %source_id, "multiplex source ended");
                return;
            }
            StreamEvent::Error { message } => {
                warn!(source = %source_id, error = %message, "multiplex source failed");
                failures.lock().unwrap().push(SourceFailure {
                    source: source_id.to_string(),
                    message,
                });
                return;
            }
            StreamEvent::Chunk(chunk) => consumer.write_chunk(chunk).await,
            StreamEvent::Status(status) => consumer.write_status(status).await,
            StreamEvent::Result(result) => consumer.write_result(result).await,
        };

        if forwarded.is_err() {
            debug!(source = %source_id, "consumer closed; dropping source");
            return;
        }
    }
    debug!(source = %source_id, "multiplex source stream closed");
}

// Direct writes bypass the per-source path: a status injected here is
// sequenced before any source event forwarded after it.
#[async_trait]
impl EventSink for StreamMultiplexer {
    async fn write_chunk(&self, chunk: ChunkEvent) -> Result<()> {
        self.consumer.write_chunk(chunk).await
    }

    async fn write_status(&self, status: StatusEvent) -> Result<()> {
        self.consumer.write_status(status).await
    }

    async fn write_result(&self, result: ResultEvent) -> Result<()> {
        self.consumer.write_result(result).await
    }

    async fn end(&self) -> Result<()> {
        self.consumer.end().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{ChannelSink, MemorySink};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn chunk(data: &str) -> StreamEvent {
        StreamEvent::Chunk(ChunkEvent::new(data))
    }

    #[tokio::test]
    async fn test_single_source_order_is_preserved_and_end_is_swallowed() {
        let (sink, mut rx) = ChannelSink::pair(16);
        let mux = StreamMultiplexer::new(Arc::new(sink));

        let (tx, source) = mpsc::channel(8);
        mux.add_channel(source, "a", None);
        for data in ["one", "two", "three"] {
            tx.send(chunk(data)).await.unwrap();
        }
        tx.send(StreamEvent::End).await.unwrap();
        mux.wait_for_all_sources().await;
        mux.end().await.unwrap();
        // Release the consumer-side sender so the drain loop below can
        // observe channel closure.
        drop(mux);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event);
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], chunk("one"));
        assert_eq!(seen[1], chunk("two"));
        assert_eq!(seen[2], chunk("three"));
        assert!(seen[3].is_end());
    }

    #[tokio::test]
    async fn test_wait_resolves_immediately_with_no_sources() {
        let mux = StreamMultiplexer::new(Arc::new(MemorySink::new()));
        timeout(Duration::from_millis(100), mux.wait_for_all_sources())
            .await
            .expect("barrier should resolve at once");
    }

    #[tokio::test]
    async fn test_wait_covers_sources_added_while_pending() {
        let mux = StreamMultiplexer::new(Arc::new(MemorySink::new()));

        let (tx_a, source_a) = mpsc::channel(4);
        mux.add_channel(source_a, "a", None);

        let waiter = {
            let mux = mux.clone();
            tokio::spawn(async move { mux.wait_for_all_sources().await })
        };
        sleep(Duration::from_millis(10)).await;

        // Second source arrives after the barrier started pending.
        let (tx_b, source_b) = mpsc::channel(4);
        mux.add_channel(source_b, "b", None);

        tx_a.send(StreamEvent::End).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished(), "barrier must cover the late source");

        tx_b.send(StreamEvent::End).await.unwrap();
        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("barrier should resolve once every source ends")
            .unwrap();
        assert_eq!(mux.source_count(), 0);
    }

    #[tokio::test]
    async fn test_erroring_source_ends_for_barrier_and_is_recorded() {
        let sink = Arc::new(MemorySink::new());
        let mux = StreamMultiplexer::new(sink.clone());

        let (tx, source) = mpsc::channel(4);
        mux.add_channel(source, "flaky", None);
        tx.send(StreamEvent::Error {
            message: "backend 500".into(),
        })
        .await
        .unwrap();

        timeout(Duration::from_secs(1), mux.wait_for_all_sources())
            .await
            .expect("errored source must count as ended");

        assert_eq!(
            mux.failures(),
            vec![SourceFailure {
                source: "flaky".into(),
                message: "backend 500".into(),
            }]
        );
        // The error is not forwarded downstream.
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_source_closing_without_end_still_releases_barrier() {
        let mux = StreamMultiplexer::new(Arc::new(MemorySink::new()));
        let (tx, source) = mpsc::channel(4);
        mux.add_channel(source, "a", None);
        drop(tx);

        timeout(Duration::from_secs(1), mux.wait_for_all_sources())
            .await
            .expect("closed stream must count as ended");
    }

    #[tokio::test]
    async fn test_transform_tags_events_with_their_source() {
        let sink = Arc::new(MemorySink::new());
        let mux = StreamMultiplexer::new(sink.clone());

        let transform: EventTransform = Arc::new(|event| event.tag_source("ctx-1"));
        let (tx, source) = mpsc::channel(4);
        mux.add_channel(source, "ctx-1", Some(transform));
        tx.send(chunk("payload")).await.unwrap();
        tx.send(StreamEvent::End).await.unwrap();
        mux.wait_for_all_sources().await;

        let events = sink.events();
        match &events[0] {
            StreamEvent::Chunk(chunk) => assert_eq!(chunk.source.as_deref(), Some("ctx-1")),
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_direct_status_injection_reaches_consumer() {
        let sink = Arc::new(MemorySink::new());
        let mux = StreamMultiplexer::new(sink.clone());

        mux.write_status(StatusEvent::progress("Sending prompt 1 of 3"))
            .await
            .unwrap();

        let statuses = sink.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].message, "Sending prompt 1 of 3");
    }
}
