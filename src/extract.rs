//! Best-effort text-delta extraction from raw provider chunks.
//!
//! Streaming providers deliver chunks as newline-delimited SSE-style
//! records, and the payload shape differs per provider family. This module
//! pulls the plain-text delta out of the shapes we know and silently skips
//! everything else; extraction feeds an out-of-band transcript and is never
//! allowed to fail the stream it observes.

use serde::Deserialize;
use tracing::debug;

const SSE_DATA_PREFIX: &str = "data: ";
const SSE_DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct RawRecord {
    delta: Option<DeltaBody>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct DeltaBody {
    text: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: Option<DeltaBody>,
    message: Option<MessageBody>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    content: Option<String>,
}

/// Extract the text delta from one streamed record, if it has one.
///
/// Accepts the record with or without its `data: ` prefix. The `[DONE]`
/// marker, unparseable payloads, and unknown shapes all yield `None`;
/// parse failures are logged at debug level and never propagate.
///
/// Recognized shapes, first match wins:
/// 1. a top-level `delta.text` field,
/// 2. `choices[0].delta.content` (streaming chat completion),
/// 3. `choices[0].message.content` (whole message embedded in a chunk).
pub fn extract_delta(record: &str) -> Option<String> {
    let body = record
        .strip_prefix(SSE_DATA_PREFIX)
        .unwrap_or(record)
        .trim();
    if body.is_empty() || body == SSE_DONE_MARKER {
        return None;
    }

    let record: RawRecord = match serde_json::from_str(body) {
        Ok(record) => record,
        Err(err) => {
            debug!(error = %err, "skipping unparseable stream record");
            return None;
        }
    };

    if let Some(text) = record.delta.and_then(|delta| delta.text) {
        return Some(text);
    }
    let first = record.choices.into_iter().next()?;
    if let Some(content) = first.delta.and_then(|delta| delta.content) {
        return Some(content);
    }
    first.message.and_then(|message| message.content)
}

/// Accumulates extracted deltas into one running transcript.
///
/// Feed it raw chunks as they arrive; it splits multi-record chunks,
/// extracts whatever deltas it recognizes, and appends them in source
/// order.
///
/// # Example
///
/// ```
/// use llm_conduit::DeltaAccumulator;
///
/// let mut transcript = DeltaAccumulator::new();
/// transcript.ingest(r#"data: {"delta": {"text": "Hello"}}"#);
/// transcript.ingest(r#"data: {"delta": {"text": ", world"}}"#);
/// transcript.ingest("data: [DONE]");
///
/// assert_eq!(transcript.text(), "Hello, world");
/// ```
#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    text: String,
}

impl DeltaAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one raw chunk, which may carry several records.
    pub fn ingest(&mut self, raw: &str) {
        for record in raw.lines() {
            if let Some(delta) = extract_delta(record) {
                self.text.push_str(&delta);
            }
        }
    }

    /// The transcript accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether nothing has been extracted yet.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Consume the accumulator, returning the transcript.
    pub fn into_text(self) -> String {
        self.text
    }
}
