//! Dispatch of one step to the invocation path its operation requires.
//!
//! Prompt and map steps run a single invocation against whatever sink the
//! caller supplies. Reduce steps run the convergence loop in
//! [`reduce`](crate::workflow::reduce), which manages its own private
//! collection before surfacing one result.

use tracing::debug;

use crate::error::Result;
use crate::invoke::LlmInvoker;
use crate::picker::ResultPicker;
use crate::request::{ChatMessage, ChatRequest, DataSource};
use crate::sink::EventSink;
use crate::workflow::{reduce, Step, StepOp};

/// Build the request body for one step invocation.
///
/// The instruction text becomes the final user turn appended to the prior
/// history; resolved sources ride along, and provider options carry over
/// unchanged.
pub(crate) fn build_request(
    history: &ChatRequest,
    instruction: &str,
    sources: Vec<DataSource>,
) -> ChatRequest {
    let mut messages = history.messages.clone();
    messages.push(ChatMessage::user(instruction));
    ChatRequest {
        messages,
        data_sources: sources,
        options: history.options.clone(),
    }
}

/// Execute one step against `sink`.
///
/// The invoker's own error signal is propagated unchanged; no response
/// content is inspected here.
pub async fn execute_step(
    step: &Step,
    sources: Vec<DataSource>,
    history: &ChatRequest,
    invoker: &dyn LlmInvoker,
    picker: &dyn ResultPicker,
    sink: &dyn EventSink,
) -> Result<()> {
    debug!(
        kind = step.op.kind(),
        output_to = %step.output_to,
        inputs = step.input.len(),
        "executing step"
    );
    match &step.op {
        StepOp::Prompt(_) | StepOp::Map(_) => {
            let request = build_request(history, step.op.instruction(), sources);
            invoker.invoke(&request, sink).await
        }
        StepOp::Reduce(_) => reduce::converge(step, sources, history, invoker, picker, sink).await,
    }
}
