//! Transport trait: the abstraction over the chat-completions endpoint.
//!
//! A Transport knows how to ship the message log plus tool schemas to the
//! remote model and hand back either a raw byte stream (streaming mode) or
//! a single decoded JSON document (non-streaming mode). It never interprets
//! the stream; framing and aggregation live above it.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::message::Message;

/// The body of a chat-completions request.
///
/// Serializes directly into the wire JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "glm-5")
    pub model: String,

    /// The full conversation log
    pub messages: Vec<Message>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Whether to stream the response as server-sent events
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSchema>>,

    /// Provider-specific reasoning switch, e.g. `{"type": "enabled"}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<serde_json::Value>,

    /// Structured-output constraint, e.g. `{"type": "json_object"}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            temperature: default_temperature(),
            stream: false,
            tools: None,
            thinking: None,
            response_format: None,
        }
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name, including any namespace prefix
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Wire wrapper: `{"type": "function", "function": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolDefinition,
}

impl From<ToolDefinition> for ToolSchema {
    fn from(function: ToolDefinition) -> Self {
        Self {
            kind: "function".into(),
            function,
        }
    }
}

/// A boxed stream of raw response body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// What a successful (2xx) transport call yields.
pub enum TransportResponse {
    /// Server-sent-event body, consumed incrementally.
    Stream(ByteStream),

    /// A complete non-streaming response document.
    Complete(serde_json::Value),
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("TransportResponse::Stream(..)"),
            Self::Complete(value) => f.debug_tuple("TransportResponse::Complete").field(value).finish(),
        }
    }
}

/// The core Transport trait.
///
/// Implementations return `Ok` only for 2xx responses; every other status,
/// network failure or timeout surfaces as a `TransportError`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// A human-readable name for this transport (e.g., "zai").
    fn name(&self) -> &str;

    /// Send a request. Streaming is selected by `request.stream`.
    async fn send(&self, request: ChatRequest) -> std::result::Result<TransportResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_wire_shape() {
        let mut req = ChatRequest::new("glm-5", vec![Message::user("hi")]);
        req.max_tokens = Some(1024);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "glm-5");
        assert_eq!(json["max_tokens"], 1024);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("stream").is_none());
        assert!(json.get("tools").is_none());
        assert!(json.get("thinking").is_none());
    }

    #[test]
    fn tool_schema_serialization() {
        let schema = ToolSchema::from(ToolDefinition {
            name: "exec_command".into(),
            description: "Execute a shell command".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "The command to run" }
                },
                "required": ["command"]
            }),
        });
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "exec_command");
        assert_eq!(json["function"]["parameters"]["required"][0], "command");
    }

    #[test]
    fn streaming_flag_serialized_when_set() {
        let mut req = ChatRequest::new("glm-5", vec![]);
        req.stream = true;
        req.thinking = Some(serde_json::json!({"type": "enabled"}));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["thinking"]["type"], "enabled");
    }
}
