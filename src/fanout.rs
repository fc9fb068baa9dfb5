//! Multi-context fan-out: one invocation per context, one merged stream.
//!
//! Each supplied context becomes its own LLM call, dispatched strictly
//! sequentially; the multiplexer fuses every call's output into the single
//! client-visible stream, with per-context progress statuses injected
//! between them. A transcript of extracted text deltas is accumulated
//! across all contexts for out-of-band analysis.

use std::sync::{Arc, Mutex};
use tracing::info;

use crate::error::Result;
use crate::event::{StatusEvent, StreamEvent};
use crate::extract::DeltaAccumulator;
use crate::invoke::{KillSwitch, LlmInvoker, NeverKilled};
use crate::multiplex::{EventTransform, StreamMultiplexer};
use crate::request::{ChatRequest, Context, DataSource};
use crate::sink::{ChannelSink, EventSink};

/// Buffer between one invocation and its multiplex drain task.
const SOURCE_BUFFER: usize = 32;

/// Outcome of one fan-out run.
#[derive(Debug)]
pub struct FanoutSummary {
    /// Contexts fully dispatched before the run stopped.
    pub dispatched: usize,
    /// Whether the kill switch stopped the run early.
    pub cancelled: bool,
    /// Text deltas extracted from every context's chunks, in order.
    pub transcript: String,
}

/// Drives one chat request across many contexts.
///
/// The output stream receives, per context, a `"Sending prompt k of n"`
/// progress status followed by that context's chunks tagged with its id.
/// After the last context a sticky completion status is written and the
/// stream is ended. The kill switch is consulted at the start of every
/// context iteration; a kill stops the run silently — the stream is ended
/// with no completion status and no error.
pub struct ContextFanout {
    invoker: Arc<dyn LlmInvoker>,
    kill: Arc<dyn KillSwitch>,
}

impl ContextFanout {
    /// Create a fan-out that is never cancelled.
    pub fn new(invoker: Arc<dyn LlmInvoker>) -> Self {
        Self {
            invoker,
            kill: Arc::new(NeverKilled),
        }
    }

    /// Attach a cancellation query.
    #[must_use]
    pub fn with_kill_switch(mut self, kill: Arc<dyn KillSwitch>) -> Self {
        self.kill = kill;
        self
    }

    /// Run `base` once per context, fusing all output into `sink`.
    ///
    /// Invocation failure aborts the run and propagates unchanged; the
    /// stream is left unended for the caller to surface the error.
    pub async fn run(
        &self,
        base: &ChatRequest,
        contexts: &[Context],
        sink: Arc<dyn EventSink>,
    ) -> Result<FanoutSummary> {
        let total = contexts.len();
        info!(contexts = total, "fanning out chat request");

        let mux = StreamMultiplexer::new(sink);
        let transcript = Arc::new(Mutex::new(DeltaAccumulator::new()));
        let mut dispatched = 0;

        for (index, context) in contexts.iter().enumerate() {
            if self.kill.is_killed().await {
                info!(context = %context.id, "request killed; stopping fan-out");
                mux.end().await?;
                return Ok(self.summarize(dispatched, true, &transcript));
            }

            mux.write_status(StatusEvent::progress(format!(
                "Sending prompt {} of {}",
                index + 1,
                total
            )))
            .await?;

            let (channel, source) = ChannelSink::pair(SOURCE_BUFFER);
            mux.add_channel(
                source,
                context.id.clone(),
                Some(source_transform(&context.id, Arc::clone(&transcript))),
            );

            let request = context_request(base, context);
            let outcome = self.invoker.invoke(&request, &channel).await;
            // The sender half must be gone before the barrier: a source
            // that never wrote its end event would otherwise pin the wait.
            drop(channel);
            outcome?;
            mux.wait_for_all_sources().await;
            dispatched += 1;
        }

        mux.write_status(StatusEvent::completed(format!(
            "Resolved {total} prompts for this request"
        )))
        .await?;
        mux.end().await?;

        Ok(self.summarize(dispatched, false, &transcript))
    }

    fn summarize(
        &self,
        dispatched: usize,
        cancelled: bool,
        transcript: &Mutex<DeltaAccumulator>,
    ) -> FanoutSummary {
        let transcript = std::mem::take(&mut *transcript.lock().unwrap()).into_text();
        FanoutSummary {
            dispatched,
            cancelled,
            transcript,
        }
    }
}

/// Per-source rewrite: feed chunk text into the shared transcript, then
/// tag the event with its context id.
fn source_transform(source_id: &str, transcript: Arc<Mutex<DeltaAccumulator>>) -> EventTransform {
    let source_id = source_id.to_string();
    Arc::new(move |event: StreamEvent| {
        if let StreamEvent::Chunk(chunk) = &event {
            transcript.lock().unwrap().ingest(&chunk.data);
        }
        event.tag_source(&source_id)
    })
}

/// Derive one context's request: the base request with the context
/// attached as an additional data source.
fn context_request(base: &ChatRequest, context: &Context) -> ChatRequest {
    let mut request = base.clone();
    request
        .data_sources
        .push(DataSource::new(context.id.clone(), context.content.clone()));
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::event::ChunkEvent;
    use crate::sink::MemorySink;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writes two delta chunks naming the context, then ends.
    struct ChunkingInvoker;

    #[async_trait]
    impl LlmInvoker for ChunkingInvoker {
        async fn invoke(&self, request: &ChatRequest, sink: &dyn EventSink) -> Result<()> {
            let ctx = request
                .data_sources
                .last()
                .map(|source| source.id.clone())
                .unwrap_or_default();
            for part in 1..=2 {
                let payload = format!("{{\"delta\": {{\"text\": \"{ctx}.{part} \"}}}}");
                sink.write_chunk(ChunkEvent::new(payload)).await?;
            }
            sink.end().await
        }
    }

    /// Reports killed from its nth consultation onward.
    struct KillOnCall {
        threshold: usize,
        calls: AtomicUsize,
    }

    impl KillOnCall {
        fn new(threshold: usize) -> Self {
            Self {
                threshold,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl KillSwitch for KillOnCall {
        async fn is_killed(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.threshold
        }
    }

    fn contexts(n: usize) -> Vec<Context> {
        (1..=n)
            .map(|i| Context::new(format!("ctx-{i}"), json!(format!("content {i}"))))
            .collect()
    }

    #[tokio::test]
    async fn test_three_contexts_interleave_statuses_chunks_and_one_end() {
        let sink = Arc::new(MemorySink::new());
        let fanout = ContextFanout::new(Arc::new(ChunkingInvoker));

        let summary = fanout
            .run(&ChatRequest::new(), &contexts(3), sink.clone())
            .await
            .unwrap();

        assert_eq!(summary.dispatched, 3);
        assert!(!summary.cancelled);

        let messages: Vec<_> = sink
            .statuses()
            .into_iter()
            .map(|status| status.message)
            .collect();
        assert_eq!(
            messages,
            vec![
                "Sending prompt 1 of 3",
                "Sending prompt 2 of 3",
                "Sending prompt 3 of 3",
                "Resolved 3 prompts for this request",
            ]
        );

        let completion = sink.statuses().pop().unwrap();
        assert!(!completion.in_progress);
        assert!(completion.sticky);

        // Full sequence: per context a status then its two tagged chunks,
        // then the completion status and exactly one end.
        let events = sink.events();
        assert_eq!(events.len(), 11);
        for (k, ctx) in ["ctx-1", "ctx-2", "ctx-3"].iter().enumerate() {
            let base = k * 3;
            assert!(matches!(&events[base], StreamEvent::Status(_)));
            for offset in 1..=2 {
                match &events[base + offset] {
                    StreamEvent::Chunk(chunk) => {
                        assert_eq!(chunk.source.as_deref(), Some(*ctx));
                    }
                    other => panic!("expected chunk, got {other:?}"),
                }
            }
        }
        assert!(events[10].is_end());
        assert_eq!(
            events.iter().filter(|event| event.is_end()).count(),
            1,
            "the merged stream must end exactly once"
        );
    }

    #[tokio::test]
    async fn test_kill_before_second_context_stops_silently() {
        let sink = Arc::new(MemorySink::new());
        let fanout = ContextFanout::new(Arc::new(ChunkingInvoker))
            .with_kill_switch(Arc::new(KillOnCall::new(2)));

        let summary = fanout
            .run(&ChatRequest::new(), &contexts(3), sink.clone())
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.dispatched, 1);

        let messages: Vec<_> = sink
            .statuses()
            .into_iter()
            .map(|status| status.message)
            .collect();
        assert_eq!(messages, vec!["Sending prompt 1 of 3"]);
        assert!(sink.is_ended());
    }

    #[tokio::test]
    async fn test_transcript_spans_contexts_in_dispatch_order() {
        let sink = Arc::new(MemorySink::new());
        let fanout = ContextFanout::new(Arc::new(ChunkingInvoker));

        let summary = fanout
            .run(&ChatRequest::new(), &contexts(2), sink)
            .await
            .unwrap();

        assert_eq!(summary.transcript, "ctx-1.1 ctx-1.2 ctx-2.1 ctx-2.2 ");
    }

    #[tokio::test]
    async fn test_invocation_failure_propagates_and_leaves_stream_open() {
        struct FailOnSecond;

        #[async_trait]
        impl LlmInvoker for FailOnSecond {
            async fn invoke(&self, request: &ChatRequest, sink: &dyn EventSink) -> Result<()> {
                if request.data_sources.last().map(|s| s.id.as_str()) == Some("ctx-2") {
                    return Err(Error::Invocation("provider timeout".into()));
                }
                sink.end().await
            }
        }

        let sink = Arc::new(MemorySink::new());
        let fanout = ContextFanout::new(Arc::new(FailOnSecond));

        let err = fanout
            .run(&ChatRequest::new(), &contexts(3), sink.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Invocation(_)));
        assert!(!sink.is_ended());
    }

    #[tokio::test]
    async fn test_context_rides_along_as_a_data_source() {
        let context = Context::new("ctx-9", json!({"doc": "body"}));
        let base = ChatRequest::new()
            .with_data_sources(vec![DataSource::new("s3://shared", json!("common"))]);

        let request = context_request(&base, &context);
        assert_eq!(request.data_sources.len(), 2);
        assert_eq!(request.data_sources[1].id, "ctx-9");
        assert_eq!(request.data_sources[1].content, json!({"doc": "body"}));
    }
}
