//! The folded outcome of one request/response round.

use serde::{Deserialize, Serialize};

use crate::message::ToolCallRequest;

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Everything one round produced, built by folding all of its frames.
///
/// Immutable once the stream ends. `tool_calls` is `None` when the model
/// asked for no tools; callers rely on that to tell "no tool calls" apart
/// from an (unreachable in practice) empty list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub content: String,
    pub reasoning: String,
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
    pub web_search: Option<serde_json::Value>,
}

impl AggregatedResult {
    /// Whether this round asks for another one.
    pub fn requests_tools(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }
}
