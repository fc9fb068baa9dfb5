//! Request-side data model: chat history, contexts, and data sources.
//!
//! These are the wire shapes handed to the LLM-invocation collaborator.
//! Serialization follows the camelCase convention of the surrounding
//! platform (`dataSources`, lowercase roles).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier scheme for data sources synthesized from prior step outputs.
pub const INTERNAL_SCHEME: &str = "obj://";

/// Speaker role for one chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Build a message with an explicit role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// A `system` turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// A `user` turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// An `assistant` turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A named content payload a request can consume.
///
/// External sources arrive from the caller with provider-style ids
/// (`s3://…` and friends); internal ones are synthesized from prior step
/// outputs under the [`INTERNAL_SCHEME`] so downstream code cannot tell
/// the two apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    #[serde(default)]
    pub content: Value,
}

impl DataSource {
    /// Wrap an externally supplied payload.
    pub fn new(id: impl Into<String>, content: Value) -> Self {
        Self {
            id: id.into(),
            content,
        }
    }

    /// Synthesize a source from a prior step's named output.
    pub fn internal(name: &str, content: Value) -> Self {
        Self::new(format!("{INTERNAL_SCHEME}{name}"), content)
    }

    /// Whether this source was synthesized from a step output.
    pub fn is_internal(&self) -> bool {
        self.id.starts_with(INTERNAL_SCHEME)
    }
}

/// One unit of grounding material merged into a single request.
///
/// The id doubles as the multiplex source key and the result key for the
/// invocation it feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    pub content: Value,
}

impl Context {
    pub fn new(id: impl Into<String>, content: Value) -> Self {
        Self {
            id: id.into(),
            content,
        }
    }
}

/// The request body handed to one LLM invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_sources: Vec<DataSource>,
    /// Opaque provider options, forwarded untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl ChatRequest {
    /// An empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// A request seeded with conversation history.
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Attach resolved data sources.
    pub fn with_data_sources(mut self, data_sources: Vec<DataSource>) -> Self {
        self.data_sources = data_sources;
        self
    }

    /// Attach provider options.
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }
}
