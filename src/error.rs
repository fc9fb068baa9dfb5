//! Error types for streaming orchestration.

use thiserror::Error;

/// The main error type for orchestration operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A workflow document failed structural validation.
    ///
    /// Raised before any step executes; the message is step-indexed where
    /// the offending step is known.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A step input name resolved to neither an external data source nor a
    /// prior step's output.
    #[error("Data source not found: {name}")]
    DataSourceNotFound {
        /// The unresolved input name, exactly as declared on the step.
        name: String,
    },

    /// The LLM-invocation collaborator signalled failure.
    ///
    /// Carried upward unchanged through the step executors.
    #[error("Invocation error: {0}")]
    Invocation(String),

    /// A workflow step failed, aborting the whole execution.
    #[error("Step {index} ({output_to}) failed: {source}")]
    StepFailed {
        /// Zero-based position of the failed step in the workflow.
        index: usize,
        /// The step's declared output name.
        output_to: String,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// The consumer side of the output stream is gone.
    #[error("Output stream closed")]
    StreamClosed,

    /// A JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A generic error with a message.
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Wrap an error as a step-indexed failure.
    pub(crate) fn at_step(self, index: usize, output_to: &str) -> Self {
        Error::StepFailed {
            index,
            output_to: output_to.to_string(),
            source: Box::new(self),
        }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Message(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Message(msg.to_string())
    }
}

/// A specialized `Result` type for orchestration operations.
pub type Result<T> = std::result::Result<T, Error>;
