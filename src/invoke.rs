//! External collaborator seams: model invocation and cancellation.
//!
//! The orchestration core never talks to a provider directly. Everything
//! it needs from the outside world enters through two narrow traits: an
//! [`LlmInvoker`] that performs one chat call against a sink, and a
//! [`KillSwitch`] consulted at safe points for cooperative cancellation.

use async_trait::async_trait;

use crate::error::Result;
use crate::request::ChatRequest;
use crate::sink::EventSink;

/// Performs one LLM chat invocation against an output sink.
///
/// An implementation must write zero or more chunk events and exactly one
/// end-of-stream signal to `sink`. The returned `Result` is the sole
/// failure signal the core inspects; response content is never validated
/// here.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use llm_conduit::{ChatRequest, ChunkEvent, EventSink, LlmInvoker, Result};
///
/// struct CannedReply;
///
/// #[async_trait]
/// impl LlmInvoker for CannedReply {
///     async fn invoke(&self, _request: &ChatRequest, sink: &dyn EventSink) -> Result<()> {
///         sink.write_chunk(ChunkEvent::new(r#"{"delta": {"text": "ok"}}"#))
///             .await?;
///         sink.end().await
///     }
/// }
/// ```
#[async_trait]
pub trait LlmInvoker: Send + Sync {
    /// Issue one chat call, streaming its output into `sink`.
    async fn invoke(&self, request: &ChatRequest, sink: &dyn EventSink) -> Result<()>;
}

/// Cooperative cancellation query.
///
/// Checked at the start of each context iteration during fan-out; a `true`
/// answer stops the request early and silently. Implementations typically
/// close over the user/stream identity they need to look the flag up.
#[async_trait]
pub trait KillSwitch: Send + Sync {
    /// Whether the current request has been killed out-of-band.
    async fn is_killed(&self) -> bool;
}

/// A [`KillSwitch`] that never fires.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverKilled;

#[async_trait]
impl KillSwitch for NeverKilled {
    async fn is_killed(&self) -> bool {
        false
    }
}
