//! In-memory result collection for fan-in pipelines.
//!
//! A [`ResultCollector`] is the terminal sink for work whose output is
//! consumed programmatically rather than streamed to a client: chunks and
//! statuses are transient and get discarded, labelled results accumulate
//! into a mapping that survives the stream.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::event::{ChunkEvent, ResultEvent, StatusEvent};
use crate::sink::EventSink;

/// Labelled results keyed by source id, in first-insertion order.
pub type CollectedResults = IndexMap<String, serde_json::Value>;

/// An [`EventSink`] that retains results and drops everything else.
///
/// Results with the same source id overwrite each other; the last write
/// wins. Insertion order of first appearance is preserved, which is what
/// makes downstream "pick the first result" behaviour deterministic.
///
/// # Example
///
/// ```
/// use llm_conduit::{EventSink, ResultCollector, ResultEvent};
///
/// tokio_test::block_on(async {
///     let collector = ResultCollector::new();
///     collector
///         .write_result(ResultEvent::new("summary", serde_json::json!("done")))
///         .await
///         .unwrap();
///     collector.end().await.unwrap();
///
///     let results = collector.into_results();
///     assert_eq!(results["summary"], serde_json::json!("done"));
/// });
/// ```
#[derive(Debug, Default)]
pub struct ResultCollector {
    results: Mutex<CollectedResults>,
    ended: Mutex<bool>,
}

impl ResultCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct result keys collected so far.
    pub fn len(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    /// Whether nothing has been collected yet.
    pub fn is_empty(&self) -> bool {
        self.results.lock().unwrap().is_empty()
    }

    /// Whether end-of-stream has been observed.
    pub fn is_ended(&self) -> bool {
        *self.ended.lock().unwrap()
    }

    /// Snapshot of the collected mapping.
    pub fn results(&self) -> CollectedResults {
        self.results.lock().unwrap().clone()
    }

    /// Consume the collector, yielding the collected mapping.
    pub fn into_results(self) -> CollectedResults {
        self.results.into_inner().unwrap()
    }
}

#[async_trait]
impl EventSink for ResultCollector {
    async fn write_chunk(&self, _chunk: ChunkEvent) -> Result<()> {
        Ok(())
    }

    async fn write_status(&self, _status: StatusEvent) -> Result<()> {
        Ok(())
    }

    async fn write_result(&self, result: ResultEvent) -> Result<()> {
        self.results
            .lock()
            .unwrap()
            .insert(result.source, result.value);
        Ok(())
    }

    async fn end(&self) -> Result<()> {
        *self.ended.lock().unwrap() = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_collector_keeps_results_and_drops_the_rest() {
        let collector = ResultCollector::new();

        collector
            .write_chunk(ChunkEvent::new("ignored"))
            .await
            .unwrap();
        collector
            .write_status(StatusEvent::progress("ignored"))
            .await
            .unwrap();
        collector
            .write_result(ResultEvent::new("a", json!({"v": 1})))
            .await
            .unwrap();

        let results = collector.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results["a"], json!({"v": 1}));
    }

    #[tokio::test]
    async fn test_collector_last_write_wins_per_source() {
        let collector = ResultCollector::new();
        collector
            .write_result(ResultEvent::new("a", json!(1)))
            .await
            .unwrap();
        collector
            .write_result(ResultEvent::new("b", json!(2)))
            .await
            .unwrap();
        collector
            .write_result(ResultEvent::new("a", json!(3)))
            .await
            .unwrap();

        let results = collector.results();
        assert_eq!(results["a"], json!(3));
        // First-insertion order survives the overwrite.
        let keys: Vec<_> = results.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_collector_tracks_end_of_stream() {
        let collector = ResultCollector::new();
        assert!(!collector.is_ended());
        collector.end().await.unwrap();
        assert!(collector.is_ended());
    }

    #[tokio::test]
    async fn test_into_results_yields_the_mapping() {
        let collector = ResultCollector::new();
        collector
            .write_result(ResultEvent::new("a", json!(1)))
            .await
            .unwrap();

        let results = collector.into_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results["a"], json!(1));
    }
}
