//! Tool Dispatch Bridge.
//!
//! Turns `(name, raw JSON arguments)` into a [`ToolResult`], whatever
//! happens. Arguments that fail to parse become `{}`. Unknown names,
//! handler errors, panics and timeouts all come back as
//! `ToolResult { success: false }`. Gated tools are refused unless the
//! approval prompt says yes, and with no prompt installed the answer is no.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lightzai_core::approval::ApprovalPrompt;
use lightzai_core::error::ToolError;
use lightzai_core::tool::{Tool, ToolRegistry, ToolResult};
use lightzai_core::transport::{ToolDefinition, ToolSchema};
use tracing::{debug, info, warn};

use crate::route::{Namespace, ToolRoute};

/// Upper bound on a single handler run.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(120);

const INVALID_ARGUMENTS_NOTE: &str = "note: the tool-call arguments were not valid JSON and were replaced with {}";

/// A dynamically registered family of tools under one name prefix.
#[async_trait]
pub trait Extension: Send + Sync {
    fn namespace(&self) -> Namespace;

    /// Definitions with model-facing (prefixed) names.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run `target` (the name with the namespace prefix removed).
    async fn call(&self, target: &str, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;
}

pub struct ToolDispatcher {
    builtins: ToolRegistry,
    extensions: BTreeMap<Namespace, Arc<dyn Extension>>,
    approval: Option<Arc<dyn ApprovalPrompt>>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(builtins: ToolRegistry) -> Self {
        Self {
            builtins,
            extensions: BTreeMap::new(),
            approval: None,
            timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }

    /// Register an extension. Replaces any extension in the same namespace.
    pub fn with_extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.insert(extension.namespace(), extension);
        self
    }

    pub fn with_approval(mut self, prompt: Arc<dyn ApprovalPrompt>) -> Self {
        self.approval = Some(prompt);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_approval(&self) -> bool {
        self.approval.is_some()
    }

    /// Every tool definition, built-ins and extensions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.builtins.definitions();
        for extension in self.extensions.values() {
            defs.extend(extension.definitions());
        }
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Wire schemas for the request's `tools` field.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.definitions().into_iter().map(ToolSchema::from).collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.definitions().into_iter().map(|d| d.name).collect()
    }

    pub async fn dispatch(&self, name: &str, raw_arguments: &str) -> ToolResult {
        let (arguments, malformed) = parse_arguments(raw_arguments);
        if malformed {
            warn!(tool = %name, "Tool arguments are not valid JSON, using {{}}");
        }

        let mut result = self.route(name, arguments).await;
        if malformed && !result.success {
            let error = result.error.take().unwrap_or_default();
            result.error = Some(if error.is_empty() {
                INVALID_ARGUMENTS_NOTE.to_string()
            } else {
                format!("{error} ({INVALID_ARGUMENTS_NOTE})")
            });
        }
        debug!(tool = %name, success = result.success, "Tool dispatched");
        result
    }

    async fn route(&self, name: &str, arguments: serde_json::Value) -> ToolResult {
        if let Some(tool) = self.builtins.get(name) {
            return self.run_builtin(tool, arguments).await;
        }

        match ToolRoute::parse(name) {
            ToolRoute::Extension { namespace, target } => match self.extensions.get(&namespace) {
                Some(extension) => {
                    let extension = Arc::clone(extension);
                    self.run_guarded(name, async move { extension.call(&target, arguments).await })
                        .await
                }
                None => ToolResult::failure(format!("No {namespace} extension is registered for tool '{name}'")),
            },
            ToolRoute::Builtin(_) => ToolResult::failure(format!("Unknown tool: {name}")),
        }
    }

    async fn run_builtin(&self, tool: Arc<dyn Tool>, arguments: serde_json::Value) -> ToolResult {
        let name = tool.name().to_string();

        if let Some(request) = tool.approval_request(&arguments) {
            let Some(prompt) = &self.approval else {
                info!(tool = %name, "No approval prompt available, denying");
                return ToolResult::denied("Approval required but no confirmation channel is available");
            };
            if !prompt.confirm(&request).await.is_approved() {
                info!(tool = %name, command = %request.command, "User declined");
                return ToolResult::denied("User declined to run the command");
            }
        }

        self.run_guarded(&name, async move { tool.execute(arguments).await })
            .await
    }

    /// Run a handler on its own task so a panic or hang cannot escape.
    async fn run_guarded<F>(&self, name: &str, handler: F) -> ToolResult
    where
        F: std::future::Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
    {
        let task = tokio::spawn(handler);
        let abort = task.abort_handle();

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => ToolResult::failure(e.to_string()),
            Ok(Err(join_error)) if join_error.is_panic() => {
                warn!(tool = %name, "Tool handler panicked");
                ToolResult::failure(format!("Tool '{name}' panicked"))
            }
            Ok(Err(join_error)) => ToolResult::failure(format!("Tool '{name}' was cancelled: {join_error}")),
            Err(_) => {
                abort.abort();
                warn!(tool = %name, timeout_secs = self.timeout.as_secs(), "Tool handler timed out");
                ToolResult::failure(
                    ToolError::Timeout {
                        tool_name: name.to_string(),
                        timeout_secs: self.timeout.as_secs(),
                    }
                    .to_string(),
                )
            }
        }
    }
}

/// Decode raw tool-call arguments. Returns `{}` and `true` when the text is
/// not valid JSON; empty text is treated as `{}` without complaint.
pub fn parse_arguments(raw: &str) -> (serde_json::Value, bool) {
    if raw.trim().is_empty() {
        return (serde_json::json!({}), false);
    }
    match serde_json::from_str(raw) {
        Ok(value) => (value, false),
        Err(_) => (serde_json::json!({}), true),
    }
}
