//! Sequential workflow execution with named output threading.

use std::sync::Arc;
use tracing::{debug, info};

use crate::collector::{CollectedResults, ResultCollector};
use crate::error::{Error, Result};
use crate::event::{ResultEvent, StatusEvent};
use crate::invoke::LlmInvoker;
use crate::picker::{FirstResultPicker, ResultPicker};
use crate::request::{ChatRequest, DataSource};
use crate::sink::EventSink;
use crate::workflow::{executor, resolve, Step, StepOutputs, Workflow};

/// Source label for a final result that is a whole output mapping rather
/// than one step's value.
const WHOLE_OUTPUT_LABEL: &str = "results";

/// Executes workflows step by step against one invocation seam.
///
/// Each step runs against a fresh private collector; its collected result
/// is published under the step's `outputTo` name, where later steps can
/// resolve it. The first failing step aborts the workflow with a
/// step-indexed error.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use llm_conduit::workflow::{engine::WorkflowEngine, Workflow};
/// use llm_conduit::{
///     ChatRequest, EventSink, LlmInvoker, MemorySink, Result, ResultEvent,
/// };
///
/// struct Canned;
///
/// #[async_trait]
/// impl LlmInvoker for Canned {
///     async fn invoke(&self, _request: &ChatRequest, sink: &dyn EventSink) -> Result<()> {
///         sink.write_result(ResultEvent::new("ctx-1", serde_json::json!("a haiku")))
///             .await?;
///         sink.end().await
///     }
/// }
///
/// tokio_test::block_on(async {
///     let workflow = Workflow::from_json(
///         r#"{"resultKey": "poem", "steps": [
///             {"prompt": "Write a haiku.", "outputTo": "poem"}
///         ]}"#,
///     )
///     .unwrap();
///
///     let engine = WorkflowEngine::new(Arc::new(Canned));
///     let sink = MemorySink::new();
///     let outputs = engine
///         .run(&workflow, &ChatRequest::new(), &[], &sink)
///         .await
///         .unwrap();
///
///     assert!(outputs.contains_key("poem"));
///     assert!(sink.is_ended());
/// });
/// ```
pub struct WorkflowEngine {
    invoker: Arc<dyn LlmInvoker>,
    picker: Arc<dyn ResultPicker>,
}

impl WorkflowEngine {
    /// Create an engine with the default first-key result heuristic.
    pub fn new(invoker: Arc<dyn LlmInvoker>) -> Self {
        Self {
            invoker,
            picker: Arc::new(FirstResultPicker),
        }
    }

    /// Replace the result-key heuristic.
    #[must_use]
    pub fn with_picker(mut self, picker: Arc<dyn ResultPicker>) -> Self {
        self.picker = picker;
        self
    }

    /// Execute `workflow`, streaming progress and the final result into
    /// `sink`.
    ///
    /// `history` seeds every step's request with prior conversation turns
    /// and provider options; `external` supplies the caller's data
    /// sources. On success the sink receives the resolved final result
    /// and is ended; the full output mapping is also returned for
    /// programmatic callers. On failure the error is returned and the
    /// sink is left unended — surfacing the failure is the caller's
    /// concern.
    pub async fn run(
        &self,
        workflow: &Workflow,
        history: &ChatRequest,
        external: &[DataSource],
        sink: &dyn EventSink,
    ) -> Result<StepOutputs> {
        info!(steps = workflow.steps.len(), "executing workflow");
        let mut outputs = StepOutputs::new();

        for (index, step) in workflow.steps.iter().enumerate() {
            if let Some(message) = &step.status_message {
                sink.write_status(StatusEvent::progress(message)).await?;
            }
            let result = self
                .run_step(step, &outputs, external, history)
                .await
                .map_err(|err| err.at_step(index, &step.output_to))?;
            debug!(output_to = %step.output_to, results = result.len(), "step completed");
            outputs.insert(step.output_to.clone(), result);
        }

        self.emit_final(workflow, &outputs, sink).await?;
        info!(outputs = outputs.len(), "workflow completed");
        Ok(outputs)
    }

    async fn run_step(
        &self,
        step: &Step,
        outputs: &StepOutputs,
        external: &[DataSource],
        history: &ChatRequest,
    ) -> Result<CollectedResults> {
        let sources = resolve::resolve_data_sources(step, outputs, external)?;
        let collector = ResultCollector::new();
        executor::execute_step(
            step,
            sources,
            history,
            self.invoker.as_ref(),
            self.picker.as_ref(),
            &collector,
        )
        .await?;
        Ok(collector.into_results())
    }

    /// Resolve and emit the workflow's final result, then end the stream.
    ///
    /// A final mapping with exactly two entries gets the result-key
    /// heuristic applied — an implicit last reduction of a dual output —
    /// otherwise the mapping is emitted as-is.
    async fn emit_final(
        &self,
        workflow: &Workflow,
        outputs: &StepOutputs,
        sink: &dyn EventSink,
    ) -> Result<()> {
        let event = match &workflow.result_key {
            Some(key) => {
                let collected = outputs.get(key).ok_or_else(|| {
                    Error::Message(format!("result key '{key}' matches no step output"))
                })?;
                match self.pick_from_pair(collected) {
                    Some(picked) => picked,
                    None => ResultEvent::new(key.clone(), serde_json::to_value(collected)?),
                }
            }
            None => {
                let as_results: CollectedResults = outputs
                    .iter()
                    .map(|(name, collected)| Ok((name.clone(), serde_json::to_value(collected)?)))
                    .collect::<Result<_>>()?;
                match self.pick_from_pair(&as_results) {
                    Some(picked) => picked,
                    None => {
                        ResultEvent::new(WHOLE_OUTPUT_LABEL, serde_json::to_value(&as_results)?)
                    }
                }
            }
        };

        sink.write_result(event).await?;
        sink.end().await
    }

    fn pick_from_pair(&self, results: &CollectedResults) -> Option<ResultEvent> {
        if results.len() != 2 {
            return None;
        }
        let key = self.picker.pick(results)?;
        let value = results.get(&key)?.clone();
        Some(ResultEvent::new(key, value))
    }
}
