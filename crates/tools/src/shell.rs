//! Shell tool: run a command through `sh -c`.
//!
//! Every run is bounded by a timeout and each output stream is capped, so
//! a runaway command can neither hang the turn nor grow memory without
//! limit. A timed-out process is killed.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lightzai_core::error::ToolError;
use lightzai_core::tool::{Tool, ToolResult};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 16 * 1024;

/// Runs shell commands with a timeout and output cap.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    max_output_bytes: usize,
    workdir: Option<PathBuf>,
}

/// What a finished (or killed) command produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn into_result(self, timeout: Duration) -> ToolResult {
        let succeeded = self.succeeded();
        let error = if self.timed_out {
            Some(format!("Command timed out after {}s", timeout.as_secs()))
        } else if !succeeded {
            Some(format!("Command exited with code {}", self.exit_code.unwrap_or(-1)))
        } else {
            None
        };
        let mut result = ToolResult::success(serde_json::to_value(&self).unwrap_or_default());
        result.success = succeeded;
        result.error = error;
        result
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_MAX_OUTPUT_BYTES)
    }
}

impl CommandRunner {
    pub fn new(timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            timeout,
            max_output_bytes,
            workdir: None,
        }
    }

    pub fn with_workdir(mut self, workdir: Option<PathBuf>) -> Self {
        self.workdir = workdir;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run(&self, command: &str) -> Result<CommandOutput, ToolError> {
        let mut shell = Command::new("sh");
        shell.arg("-c").arg(command);
        self.run_with_input(&mut shell, None).await
    }

    /// Run a prepared command, optionally feeding `stdin`.
    pub async fn run_with_input(
        &self,
        command: &mut Command,
        stdin: Option<Vec<u8>>,
    ) -> Result<CommandOutput, ToolError> {
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        command
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| ToolError::ExecutionFailed {
            tool_name: "exec_command".into(),
            reason: format!("Failed to spawn: {e}"),
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&input).await {
                    debug!(error = %e, "Child closed stdin early");
                }
            });
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let cap = self.max_output_bytes;

        let outcome = tokio::time::timeout(self.timeout, async {
            let ((out, out_cut), (err, err_cut)) =
                tokio::join!(read_capped(stdout, cap), read_capped(stderr, cap));
            let status = child.wait().await;
            (out, err, out_cut || err_cut, status)
        })
        .await;

        match outcome {
            Ok((stdout, stderr, truncated, status)) => {
                let status = status.map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "exec_command".into(),
                    reason: e.to_string(),
                })?;
                Ok(CommandOutput {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                    truncated,
                    timed_out: false,
                })
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Command timed out, killing");
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Kill after timeout failed");
                }
                Ok(CommandOutput {
                    timed_out: true,
                    ..CommandOutput::default()
                })
            }
        }
    }
}

/// Read a stream to EOF keeping at most `cap` bytes. Excess is drained so
/// the child never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> (String, bool) {
    let Some(mut reader) = reader else {
        return (String::new(), false);
    };
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    (String::from_utf8_lossy(&kept).into_owned(), truncated)
}

/// `exec_command`: run a shell command without confirmation.
pub struct ExecCommandTool {
    runner: Arc<CommandRunner>,
}

impl ExecCommandTool {
    pub fn new(runner: Arc<CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Tool for ExecCommandTool {
    fn name(&self) -> &str {
        "exec_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command (sh -c) in the workspace and return exit code, stdout and stderr."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = arguments["command"]
            .as_str()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        debug!(command = %command, "Executing shell command");
        let output = self.runner.run(command).await?;
        Ok(output.into_result(self.runner.timeout()))
    }
}
