//! `confirm_exec`: a shell command that only runs after explicit approval.
//!
//! The tool itself just runs the command. Gating happens in the
//! dispatcher, which asks the approval prompt using
//! [`Tool::approval_request`] before `execute` is ever called.

use std::sync::Arc;

use async_trait::async_trait;
use lightzai_core::approval::ApprovalRequest;
use lightzai_core::error::ToolError;
use lightzai_core::tool::{Tool, ToolResult};
use tracing::info;

use crate::shell::CommandRunner;

pub struct ConfirmExecTool {
    runner: Arc<CommandRunner>,
}

impl ConfirmExecTool {
    pub fn new(runner: Arc<CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Tool for ConfirmExecTool {
    fn name(&self) -> &str {
        "confirm_exec"
    }

    fn description(&self) -> &str {
        "Run a potentially destructive or privileged shell command after the user explicitly approves it. \
         Always state the reason."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to run once approved"
                },
                "reason": {
                    "type": "string",
                    "description": "Why this command is needed"
                }
            },
            "required": ["command"]
        })
    }

    fn approval_request(&self, arguments: &serde_json::Value) -> Option<ApprovalRequest> {
        Some(ApprovalRequest {
            tool: self.name().to_string(),
            command: arguments["command"].as_str().unwrap_or_default().to_string(),
            reason: arguments["reason"].as_str().map(str::to_owned),
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = arguments["command"]
            .as_str()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        info!(command = %command, "Running approved command");
        let output = self.runner.run(command).await?;
        Ok(output.into_result(self.runner.timeout()).with("approved", true))
    }
}
