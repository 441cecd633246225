//! Shared deterministic types for the phase loop.
//!
//! These types define the contracts between the turn codec, the tool bridge,
//! the phase engine and the finalizer. They must not depend on I/O.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifying data for the work item being resolved.
///
/// Created once by the task lookup at run start and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

impl TaskContext {
    /// Short human reference, e.g. `acme/widgets#42`.
    pub fn reference(&self) -> String {
        format!("{}/{}#{}", self.owner, self.repo, self.number)
    }

    /// Text handed to the similarity provider.
    pub fn similarity_query(&self) -> String {
        format!("{}\n\n{}", self.title.trim(), self.body.trim())
    }
}

/// Owner of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-injected instructions and tool results.
    Requester,
    /// Output of the language model.
    Model,
}

/// A normalized content block. Every raw model block is decoded into one of
/// these before the engine looks at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl Block {
    pub fn text(text: impl Into<String>) -> Self {
        Block::Text { text: text.into() }
    }
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub blocks: Vec<Block>,
}

impl Turn {
    /// Concatenated text blocks of this turn.
    pub fn text(&self) -> String {
        let parts: Vec<&str> = self
            .blocks
            .iter()
            .filter_map(|block| match block {
                Block::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        parts.join("\n")
    }
}

/// Append-only conversation state.
///
/// There is deliberately no API to remove or reorder turns; the phase engine is
/// the only owner and only ever pushes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_requester(&mut self, blocks: Vec<Block>) {
        self.turns.push(Turn {
            role: Role::Requester,
            blocks,
        });
    }

    pub fn push_model(&mut self, blocks: Vec<Block>) {
        self.turns.push(Turn {
            role: Role::Model,
            blocks,
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// Structured task metadata the model must emit before any action.
///
/// Advisory except for `phase_complete`, which the engine honors. Built by
/// [`crate::core::protocol::parse_metadata`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskMetadata {
    pub phase: Option<String>,
    pub task: Option<String>,
    pub rationale: Option<String>,
    pub success_criteria: Vec<String>,
    pub tool: Option<String>,
    pub phase_complete: bool,
}

/// A tool call requested by the model in one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Success or error payload of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOutcome {
    Success(Value),
    Error(String),
}

/// Result paired with the invocation that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(tool_use_id: impl Into<String>, value: Value) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            outcome: ToolOutcome::Success(value),
        }
    }

    pub fn error(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            outcome: ToolOutcome::Error(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error(_))
    }

    /// Fold into a conversation block. String payloads are passed through as-is,
    /// everything else is serialized as compact JSON.
    pub fn into_block(self) -> Block {
        match self.outcome {
            ToolOutcome::Success(Value::String(text)) => Block::ToolResult {
                tool_use_id: self.tool_use_id,
                content: text,
                is_error: false,
            },
            ToolOutcome::Success(value) => Block::ToolResult {
                tool_use_id: self.tool_use_id,
                content: value.to_string(),
                is_error: false,
            },
            ToolOutcome::Error(message) => Block::ToolResult {
                tool_use_id: self.tool_use_id,
                content: format!("error: {message}"),
                is_error: true,
            },
        }
    }
}

/// Tool description as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "inputSchema")]
    pub input_schema: Option<Value>,
}
