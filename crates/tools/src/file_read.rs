//! File read tool: read file contents with path validation.

use std::sync::Arc;

use async_trait::async_trait;
use lightzai_core::error::ToolError;
use lightzai_core::tool::{Tool, ToolResult};
use tokio::io::AsyncReadExt;

use crate::path::Sandbox;

/// Largest prefix of a file returned to the model.
pub const MAX_READ_BYTES: u64 = 256 * 1024;

pub struct FileReadTool {
    sandbox: Arc<Sandbox>,
}

impl FileReadTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file. Relative paths are resolved against the workspace."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let resolved = self.sandbox.resolve(path).map_err(|e| ToolError::PermissionDenied {
            tool_name: "read_file".into(),
            reason: e.to_string(),
        })?;

        let file = match tokio::fs::File::open(&resolved).await {
            Ok(file) => file,
            Err(e) => return Ok(ToolResult::failure(format!("Failed to read file: {e}"))),
        };
        let size = file.metadata().await.map(|m| m.len()).unwrap_or(0);

        let mut bytes = Vec::new();
        if let Err(e) = file.take(MAX_READ_BYTES).read_to_end(&mut bytes).await {
            return Ok(ToolResult::failure(format!("Failed to read file: {e}")));
        }

        Ok(ToolResult::success(serde_json::json!({
            "path": resolved.to_string_lossy(),
            "content": String::from_utf8_lossy(&bytes),
            "bytes": size,
            "truncated": size > MAX_READ_BYTES,
        })))
    }
}
