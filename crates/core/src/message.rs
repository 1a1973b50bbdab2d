//! Message and conversation-log domain types.
//!
//! These are the core value objects that flow through the entire system:
//! the user types a message → the orchestrator appends it to the log →
//! the transport ships the whole log → the assistant answers (possibly with
//! tool calls) → tool results are appended → repeat.
//!
//! `Message` serializes directly into the chat-completions wire shape.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (persona, tool availability)
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content. Serialized as `null` when absent, which is how an
    /// assistant message that only carries tool calls looks on the wire.
    #[serde(default)]
    pub content: Option<String>,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, Some(content.into()))
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, Some(content.into()))
    }

    /// Create a new plain assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(content.into()))
    }

    /// Create an assistant message that requests tool calls.
    ///
    /// Empty content collapses to `null`.
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        let content = content.into();
        Self {
            role: Role::Assistant,
            content: (!content.is_empty()).then_some(content),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// The text content, or an empty string.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Whether this is an assistant message carrying at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }
}

/// A tool call requested by the model, in wire format.
///
/// Built incrementally while streaming: `function.name` is set once,
/// `function.arguments` is concatenated across fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique ID for this tool call
    pub id: String,

    /// Always `"function"` for chat-completions endpoints
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,

    /// The function to invoke
    pub function: FunctionCall,
}

fn default_call_type() -> String {
    "function".into()
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: default_call_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Function name plus JSON-encoded arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,

    /// Arguments as a JSON-encoded string
    #[serde(default)]
    pub arguments: String,
}

/// The ordered conversation log.
///
/// Grows by appends only. The first element, when it is a system message,
/// may have its content regenerated but is never reordered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log that starts with a system prompt.
    pub fn with_system(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(prompt)],
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append several messages in order.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop everything after the first `len` messages.
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    /// The system message, if the log starts with one.
    pub fn system(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.role == Role::System)
    }

    /// Replace the system prompt in place, inserting one at the front if the
    /// log has none.
    pub fn set_system(&mut self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => first.content = Some(prompt),
            _ => self.messages.insert(0, Message::system(prompt)),
        }
    }

    /// Drop all messages except the system prompt.
    pub fn clear(&mut self) {
        let keep = usize::from(self.system().is_some());
        self.messages.truncate(keep);
    }

    /// Replace the whole message list (used by history-limit policies).
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Check that every tool message answers a tool call issued by the
    /// assistant message that opened its group.
    pub fn validate(&self) -> Result<()> {
        let mut open_ids: Vec<&str> = Vec::new();
        for (position, message) in self.messages.iter().enumerate() {
            match message.role {
                Role::Tool => {
                    let id = message.tool_call_id.as_deref().unwrap_or("");
                    if !open_ids.contains(&id) {
                        return Err(Error::Protocol(format!(
                            "tool message at position {position} answers unknown tool_call_id '{id}'"
                        )));
                    }
                }
                Role::Assistant => {
                    open_ids = message
                        .tool_calls
                        .iter()
                        .flatten()
                        .map(|call| call.id.as_str())
                        .collect();
                }
                Role::System | Role::User => open_ids.clear(),
            }
        }
        Ok(())
    }
}
