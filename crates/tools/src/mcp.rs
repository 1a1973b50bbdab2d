//! MCP namespace: tools served by external tool servers.
//!
//! Each server is exposed as `mcp__<server>__<tool>`. How a server is
//! reached (subprocess, HTTP) is the [`McpServer`] implementation's
//! business; this module only names and routes.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use lightzai_core::error::ToolError;
use lightzai_core::tool::ToolResult;
use lightzai_core::transport::ToolDefinition;

use crate::dispatch::Extension;
use crate::route::{Namespace, SEPARATOR};

/// A connected tool server.
#[async_trait]
pub trait McpServer: Send + Sync {
    /// Server name as it appears in tool names. Must not contain `__`.
    fn name(&self) -> &str;

    /// The server's tools with unprefixed names.
    fn tools(&self) -> Vec<ToolDefinition>;

    async fn call_tool(&self, tool: &str, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;
}

#[derive(Default)]
pub struct McpExtension {
    servers: BTreeMap<String, Arc<dyn McpServer>>,
}

impl McpExtension {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, server: Arc<dyn McpServer>) -> Result<(), ToolError> {
        let name = server.name().to_string();
        if name.is_empty() || name.contains(SEPARATOR) {
            return Err(ToolError::InvalidArguments(format!(
                "MCP server name '{name}' must be non-empty and must not contain '{SEPARATOR}'"
            )));
        }
        self.servers.insert(name, server);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[async_trait]
impl Extension for McpExtension {
    fn namespace(&self) -> Namespace {
        Namespace::Mcp
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.servers
            .iter()
            .flat_map(|(server, handle)| {
                handle.tools().into_iter().map(move |tool| ToolDefinition {
                    name: Namespace::Mcp.qualify(&format!("{server}{SEPARATOR}{}", tool.name)),
                    ..tool
                })
            })
            .collect()
    }

    async fn call(&self, target: &str, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let (server, tool) = target
            .split_once(SEPARATOR)
            .ok_or_else(|| ToolError::NotFound(Namespace::Mcp.qualify(target)))?;
        let handle = self
            .servers
            .get(server)
            .ok_or_else(|| ToolError::NotFound(format!("MCP server '{server}'")))?;
        handle.call_tool(tool, arguments).await
    }
}
