//! Declarative workflows: documents, validation, and execution.
//!
//! A workflow is an ordered list of steps, each reading named data
//! sources and publishing its result under a name later steps can
//! reference. Documents arrive as JSON, are validated structurally before
//! anything executes, and run under the [`engine::WorkflowEngine`].

pub mod engine;
pub mod executor;
pub mod reduce;
pub mod resolve;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::collector::CollectedResults;
use crate::error::{Error, Result};

/// Step results published so far, keyed by `outputTo` name.
///
/// Append-only for the duration of one execution; insertion order follows
/// step order.
pub type StepOutputs = IndexMap<String, CollectedResults>;

/// Raw workflow document, pre-validation.
///
/// Unknown fields reject the document outright; the schema is closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkflowDoc {
    /// Which step's output is the workflow's final result. Absent means
    /// the whole output mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_key: Option<String>,
    pub steps: Vec<StepDoc>,
}

impl WorkflowDoc {
    /// Check structural invariants and produce the executable model.
    ///
    /// The only check beyond what serde enforces is the operation count:
    /// each step must carry exactly one of `prompt`, `map`, `reduce`.
    pub fn validate(self) -> Result<Workflow> {
        let steps = self
            .steps
            .into_iter()
            .enumerate()
            .map(|(index, step)| step.validate(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Workflow {
            result_key: self.result_key,
            steps,
        })
    }
}

/// One step as written in the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StepDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default)]
    pub input: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
    pub output_to: String,
}

impl StepDoc {
    fn validate(self, index: usize) -> Result<Step> {
        let op = match (self.prompt, self.map, self.reduce) {
            (Some(text), None, None) => StepOp::Prompt(text),
            (None, Some(text), None) => StepOp::Map(text),
            (None, None, Some(text)) => StepOp::Reduce(text),
            (None, None, None) => {
                return Err(Error::Validation(format!(
                    "step {index} must declare one of prompt, map, or reduce"
                )))
            }
            _ => {
                return Err(Error::Validation(format!(
                    "step {index} declares more than one of prompt, map, and reduce"
                )))
            }
        };
        Ok(Step {
            status_message: self.status_message,
            input: self.input,
            op,
            output_to: self.output_to,
        })
    }
}

/// A validated, executable workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    pub result_key: Option<String>,
    pub steps: Vec<Step>,
}

impl Workflow {
    /// Parse a JSON document and validate it in one go.
    ///
    /// # Example
    ///
    /// ```
    /// use llm_conduit::workflow::{StepOp, Workflow};
    ///
    /// let workflow = Workflow::from_json(
    ///     r#"{
    ///         "resultKey": "summary",
    ///         "steps": [
    ///             {"input": ["s3://doc"], "prompt": "Summarize this.", "outputTo": "summary"}
    ///         ]
    ///     }"#,
    /// )
    /// .unwrap();
    ///
    /// assert!(matches!(workflow.steps[0].op, StepOp::Prompt(_)));
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: WorkflowDoc = serde_json::from_str(json)
            .map_err(|err| Error::Validation(format!("malformed workflow document: {err}")))?;
        doc.validate()
    }

    /// Validate a document already parsed into a [`serde_json::Value`].
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let doc: WorkflowDoc = serde_json::from_value(value)
            .map_err(|err| Error::Validation(format!("malformed workflow document: {err}")))?;
        doc.validate()
    }
}

/// One validated workflow instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// User-visible progress text, emitted before the step runs.
    pub status_message: Option<String>,
    /// Data-source names this step reads, in declaration order.
    pub input: Vec<String>,
    pub op: StepOp,
    /// Name under which the step's result is published.
    pub output_to: String,
}

impl Step {
    /// Derived copy with a replacement input list.
    ///
    /// Reduction rounds re-feed a step its own prior output this way; the
    /// operation, status text, and output name are preserved.
    pub fn with_input(&self, input: Vec<String>) -> Self {
        Self {
            input,
            ..self.clone()
        }
    }
}

/// The operation a step performs, carrying its instruction text.
///
/// Prompt and Map currently share mechanics; they stay separate variants
/// so their behaviour can diverge without reinterpreting instruction
/// text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOp {
    Prompt(String),
    Map(String),
    Reduce(String),
}

impl StepOp {
    /// The instruction text, regardless of variant.
    pub fn instruction(&self) -> &str {
        match self {
            Self::Prompt(text) | Self::Map(text) | Self::Reduce(text) => text,
        }
    }

    /// Short name for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Prompt(_) => "prompt",
            Self::Map(_) => "map",
            Self::Reduce(_) => "reduce",
        }
    }
}
