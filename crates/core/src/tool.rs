//! Tool trait: the abstraction over locally executed capabilities.
//!
//! Tools are what give the model the ability to act in the world:
//! read and write files, run commands, search the web, etc.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::approval::ApprovalRequest;
use crate::error::ToolError;
use crate::transport::ToolDefinition;

/// Keys owned by [`ToolResult`] itself; never allowed in the payload.
const RESERVED_KEYS: [&str; 3] = ["success", "denied", "error"];

/// The result of a tool execution: `{ success, ...payload }`.
///
/// Opaque to the protocol layer beyond `success`; serialized to a JSON
/// string and placed into a `tool` message's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// Set when an approval gate refused the call
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub denied: bool,

    /// Human-readable failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Tool-specific fields
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl ToolResult {
    /// A successful result carrying structured data. Objects are flattened
    /// into the payload, minus the reserved top-level keys; any other JSON
    /// value lands under `result`.
    pub fn success(data: serde_json::Value) -> Self {
        let payload = match data {
            serde_json::Value::Object(mut map) => {
                for key in RESERVED_KEYS {
                    map.remove(key);
                }
                map
            }
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("result".into(), other);
                map
            }
        };
        Self {
            success: true,
            denied: false,
            error: None,
            payload,
        }
    }

    /// A successful result carrying plain text under `output`.
    pub fn output(text: impl Into<String>) -> Self {
        Self::success(serde_json::json!({ "output": text.into() }))
    }

    /// A failed result.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            denied: false,
            error: Some(error.into()),
            payload: serde_json::Map::new(),
        }
    }

    /// A refused result: a valid outcome, not an error.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            denied: true,
            ..Self::failure(reason)
        }
    }

    /// Attach an extra payload field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let key = key.into();
        if !RESERVED_KEYS.contains(&key.as_str()) {
            self.payload.insert(key, value.into());
        }
        self
    }

    /// Serialize for a `tool` message, whose content is string-only.
    pub fn to_content(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"success":false,"error":"unserializable tool result: {e}"}}"#))
    }
}

/// The core Tool trait.
///
/// Each built-in tool implements this trait. Tools are registered in the
/// `ToolRegistry` and reached through the dispatch bridge.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "exec_command", "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Confirmation required before `execute` may run. `None` means the
    /// tool is never gated.
    fn approval_request(&self, _arguments: &serde_json::Value) -> Option<ApprovalRequest> {
        None
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of built-in tools, keyed by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get all tool definitions (for sending to the LLM), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
