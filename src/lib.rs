//! # llm-conduit
//!
//! Streaming orchestration primitives for LLM pipelines in Rust.
//!
//! This crate provides the plumbing between "a model call that streams"
//! and "one coherent client-visible stream": multi-context fan-out with
//! fan-in multiplexing, and a declarative prompt/map/reduce workflow
//! engine that threads named outputs between steps and recursively
//! reduces many partial answers down to one.
//!
//! ## Core Concepts
//!
//! - **EventSink**: The capability contract every output stream satisfies
//! - **StreamMultiplexer**: Fuses N independent sub-streams into one ordered output
//! - **ResultCollector**: Captures labelled results instead of forwarding them live
//! - **ContextFanout**: One LLM call per context, merged into a single stream
//! - **WorkflowEngine**: Sequential prompt/map/reduce steps over named data sources
//! - **DeltaAccumulator**: Best-effort transcript extraction from raw chunks
//! - **LlmInvoker / KillSwitch / ResultPicker**: The seams to the outside world
//!
//! ## Example: Fan One Request Out Across Contexts
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use llm_conduit::{
//!     ChatRequest, ChunkEvent, Context, ContextFanout, EventSink, LlmInvoker,
//!     MemorySink, Result,
//! };
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl LlmInvoker for Echo {
//!     async fn invoke(&self, request: &ChatRequest, sink: &dyn EventSink) -> Result<()> {
//!         let ctx = request.data_sources.last().unwrap().id.clone();
//!         sink.write_chunk(ChunkEvent::new(format!(
//!             r#"{{"delta": {{"text": "{ctx} ok "}}}}"#
//!         )))
//!         .await?;
//!         sink.end().await
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let sink = Arc::new(MemorySink::new());
//! let fanout = ContextFanout::new(Arc::new(Echo));
//! let summary = fanout
//!     .run(
//!         &ChatRequest::new(),
//!         &[
//!             Context::new("ctx-1", serde_json::json!("first document")),
//!             Context::new("ctx-2", serde_json::json!("second document")),
//!         ],
//!         sink.clone(),
//!     )
//!     .await
//!     .unwrap();
//!
//! assert_eq!(summary.dispatched, 2);
//! assert_eq!(summary.transcript, "ctx-1 ok ctx-2 ok ");
//! assert!(sink.is_ended());
//! # });
//! ```

pub mod error;
pub mod event;
pub mod sink;
pub mod collector;
pub mod extract;
pub mod request;
pub mod invoke;
pub mod picker;
pub mod multiplex;
pub mod fanout;
pub mod workflow;

pub use collector::{CollectedResults, ResultCollector};
pub use error::{Error, Result};
pub use event::{ChunkEvent, ResultEvent, StatusEvent, StreamEvent};
pub use extract::{extract_delta, DeltaAccumulator};
pub use fanout::{ContextFanout, FanoutSummary};
pub use invoke::{KillSwitch, LlmInvoker, NeverKilled};
pub use multiplex::{EventTransform, SourceFailure, StreamMultiplexer};
pub use picker::{FirstResultPicker, ResultPicker};
pub use request::{ChatMessage, ChatRequest, Context, DataSource, Role, INTERNAL_SCHEME};
pub use sink::{ChannelSink, EventSink, MemorySink};

// Re-export workflow types
pub use workflow::engine::WorkflowEngine;
pub use workflow::{Step, StepDoc, StepOp, StepOutputs, Workflow, WorkflowDoc};
