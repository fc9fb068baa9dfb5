//! Stream event types shared by sinks, the multiplexer, and the engines.
//!
//! Every event that can appear on the client-visible output stream is a
//! [`StreamEvent`]. The serialized form is tag-discriminated so a consumer
//! can route events without knowing which source produced them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event on an output stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A raw provider-format chunk, forwarded without interpretation.
    Chunk(ChunkEvent),

    /// A user-visible progress or metadata update.
    Status(StatusEvent),

    /// A labelled partial or final result.
    Result(ResultEvent),

    /// A failure inside one source stream.
    ///
    /// Sources that emit this are treated as ended; the error is recorded
    /// by the multiplexer rather than forwarded to the consumer.
    Error {
        /// Description of the source failure.
        message: String,
    },

    /// End-of-stream signal.
    End,
}

impl StreamEvent {
    /// Returns `true` for the end-of-stream signal.
    pub fn is_end(&self) -> bool {
        matches!(self, StreamEvent::End)
    }

    /// Fill in the multiplex source tag where the event does not already
    /// carry one.
    ///
    /// Used by per-source transforms to attribute provider events to the
    /// context or data source that produced them. Tags set by the producer
    /// are left untouched.
    #[must_use]
    pub fn tag_source(self, source_id: &str) -> Self {
        match self {
            StreamEvent::Chunk(chunk) if chunk.source.is_none() => StreamEvent::Chunk(ChunkEvent {
                source: Some(source_id.to_string()),
                ..chunk
            }),
            StreamEvent::Status(status) if status.data_source.is_none() => {
                StreamEvent::Status(status.with_data_source(source_id))
            }
            StreamEvent::Result(result) if result.source.is_empty() => {
                StreamEvent::Result(ResultEvent {
                    source: source_id.to_string(),
                    ..result
                })
            }
            other => other,
        }
    }
}

/// A raw streamed chunk plus an optional multiplex source tag.
///
/// The payload is kept as opaque wire text; the orchestration core never
/// interprets it beyond the delta extraction in [`crate::extract`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkEvent {
    /// The chunk exactly as the provider produced it. May contain several
    /// newline-delimited `data: ` records.
    pub data: String,
    /// Identifier of the source this chunk belongs to, once tagged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ChunkEvent {
    /// Create an untagged chunk from raw provider output.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            source: None,
        }
    }

    /// Attach a source tag.
    #[must_use]
    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source = Some(source_id.into());
        self
    }
}

/// A user-visible status update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    /// Whether the reported activity is still running.
    pub in_progress: bool,
    /// The progress text shown to the user.
    pub message: String,
    /// Icon hint for the client.
    pub icon: String,
    /// Whether the client should keep the status visible after newer ones
    /// arrive.
    pub sticky: bool,
    /// The data source this status refers to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
}

impl StatusEvent {
    /// An in-progress status.
    pub fn progress(message: impl Into<String>) -> Self {
        Self {
            in_progress: true,
            message: message.into(),
            icon: "bolt".to_string(),
            sticky: false,
            data_source: None,
        }
    }

    /// A completed, sticky status.
    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            in_progress: false,
            message: message.into(),
            icon: "check".to_string(),
            sticky: true,
            data_source: None,
        }
    }

    /// Attach the data source this status refers to.
    #[must_use]
    pub fn with_data_source(mut self, source_id: impl Into<String>) -> Self {
        self.data_source = Some(source_id.into());
        self
    }
}

/// A labelled result value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultEvent {
    /// Identifier of the source or output this result belongs to.
    pub source: String,
    /// The result payload.
    pub value: Value,
}

impl ResultEvent {
    /// Create a result labelled with the given source identifier.
    pub fn new(source: impl Into<String>, value: Value) -> Self {
        Self {
            source: source.into(),
            value,
        }
    }
}
