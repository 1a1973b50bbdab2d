//! Directory listing tool.

use std::sync::Arc;

use async_trait::async_trait;
use lightzai_core::error::ToolError;
use lightzai_core::tool::{Tool, ToolResult};

use crate::path::Sandbox;

pub const MAX_ENTRIES: usize = 500;

pub struct ListFilesTool {
    sandbox: Arc<Sandbox>,
}

impl ListFilesTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the entries of a directory (name, type, size). Defaults to the workspace root."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (default \".\")"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"].as_str().unwrap_or(".");
        let resolved = self.sandbox.resolve(path).map_err(|e| ToolError::PermissionDenied {
            tool_name: "list_files".into(),
            reason: e.to_string(),
        })?;

        let mut dir = match tokio::fs::read_dir(&resolved).await {
            Ok(dir) => dir,
            Err(e) => return Ok(ToolResult::failure(format!("Failed to list directory: {e}"))),
        };

        let mut entries = Vec::new();
        let mut truncated = false;
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Ok(ToolResult::failure(format!("Failed to list directory: {e}"))),
            };
            if entries.len() == MAX_ENTRIES {
                truncated = true;
                break;
            }
            let (kind, size) = match entry.metadata().await {
                Ok(meta) if meta.is_dir() => ("dir", 0),
                Ok(meta) if meta.is_symlink() => ("symlink", 0),
                Ok(meta) => ("file", meta.len()),
                Err(_) => ("unknown", 0),
            };
            entries.push(serde_json::json!({
                "name": entry.file_name().to_string_lossy(),
                "type": kind,
                "size": size,
            }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        Ok(ToolResult::success(serde_json::json!({
            "path": resolved.to_string_lossy(),
            "entries": entries,
            "truncated": truncated,
        })))
    }
}
