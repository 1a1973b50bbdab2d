//! Web tools backed by the Z.AI REST API: `web_search` and `web_read`.
//!
//! Both post JSON to endpoints under the configured API base using the same
//! bearer key as chat completions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lightzai_core::error::ToolError;
use lightzai_core::tool::{Tool, ToolResult};
use tracing::debug;

/// Shared HTTP client for Z.AI tool endpoints.
#[derive(Clone)]
pub struct ZaiApi {
    http: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for ZaiApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZaiApi")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl ZaiApi {
    /// `api_base` is the URL prefix endpoints are appended to, e.g.
    /// `https://api.z.ai/api/paas/v4`.
    pub fn new(api_base: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// POST `body` to `{api_base}{path}` and return the JSON reply.
    pub async fn post(&self, tool: &str, path: &str, body: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let key = self.api_key.as_deref().ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: tool.into(),
            reason: "API key is not configured".into(),
        })?;
        let url = format!("{}{path}", self.api_base);
        debug!(tool, url = %url, "Calling tool endpoint");

        let response = self
            .http
            .post(&url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: tool.into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed {
                tool_name: tool.into(),
                reason: format!("HTTP {}: {}", status.as_u16(), text.trim()),
            });
        }
        serde_json::from_str(&text).map_err(|e| ToolError::ExecutionFailed {
            tool_name: tool.into(),
            reason: format!("Invalid JSON reply: {e}"),
        })
    }
}

pub struct WebSearchTool {
    api: Arc<ZaiApi>,
}

impl WebSearchTool {
    pub fn new(api: Arc<ZaiApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Returns a list of results with title, link and a content snippet."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "count": {
                    "type": "integer",
                    "description": "Number of results to return (default 5, max 20)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let count = arguments["count"].as_u64().unwrap_or(5).clamp(1, 20);

        let reply = self
            .api
            .post(
                self.name(),
                "/web_search",
                serde_json::json!({
                    "search_engine": "search_std",
                    "search_query": query,
                    "count": count,
                }),
            )
            .await?;

        let results: Vec<serde_json::Value> = reply["search_result"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        serde_json::json!({
                            "title": item["title"],
                            "link": item["link"],
                            "content": item["content"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ToolResult::success(serde_json::json!({
            "query": query,
            "results": results,
        })))
    }
}

pub struct WebReadTool {
    api: Arc<ZaiApi>,
}

impl WebReadTool {
    pub fn new(api: Arc<ZaiApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for WebReadTool {
    fn name(&self) -> &str {
        "web_read"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its main content as markdown text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The page URL (http or https)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let url = arguments["url"]
            .as_str()
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
            .ok_or_else(|| ToolError::InvalidArguments("'url' must be an http(s) URL".into()))?;

        let reply = self
            .api
            .post(self.name(), "/reader", serde_json::json!({ "url": url }))
            .await?;

        let page = &reply["reader_result"];
        if page.is_null() {
            return Ok(ToolResult::failure("Reader returned no content"));
        }
        Ok(ToolResult::success(serde_json::json!({
            "url": page["url"].as_str().unwrap_or(url),
            "title": page["title"],
            "content": page["content"],
        })))
    }
}
