//! File write tool: write or create files with path validation.

use std::sync::Arc;

use async_trait::async_trait;
use lightzai_core::error::ToolError;
use lightzai_core::tool::{Tool, ToolResult};

use crate::path::Sandbox;

pub struct FileWriteTool {
    sandbox: Arc<Sandbox>,
}

impl FileWriteTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file and missing parent directories; overwrites unless append is true."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                },
                "append": {
                    "type": "boolean",
                    "description": "Append instead of overwriting (default false)"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        let append = arguments["append"].as_bool().unwrap_or(false);

        let resolved = self.sandbox.resolve(path).map_err(|e| ToolError::PermissionDenied {
            tool_name: "write_file".into(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = resolved.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::failure(format!("Failed to create directories: {e}")));
        }

        let written = if append {
            use tokio::io::AsyncWriteExt;
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&resolved)
                .await
            {
                Ok(mut file) => file.write_all(content.as_bytes()).await,
                Err(e) => Err(e),
            }
        } else {
            tokio::fs::write(&resolved, content).await
        };

        match written {
            Ok(()) => Ok(ToolResult::success(serde_json::json!({
                "path": resolved.to_string_lossy(),
                "bytes_written": content.len(),
                "appended": append,
            }))),
            Err(e) => Ok(ToolResult::failure(format!("Failed to write file: {e}"))),
        }
    }
}
