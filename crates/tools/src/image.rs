//! `generate_image`: text-to-image through the Z.AI images endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use lightzai_core::error::ToolError;
use lightzai_core::tool::{Tool, ToolResult};

use crate::web::ZaiApi;

pub const DEFAULT_IMAGE_MODEL: &str = "cogview-4";
const SIZES: [&str; 4] = ["1024x1024", "768x1344", "1344x768", "1440x720"];

pub struct GenerateImageTool {
    api: Arc<ZaiApi>,
    model: String,
}

impl GenerateImageTool {
    pub fn new(api: Arc<ZaiApi>) -> Self {
        Self {
            api,
            model: DEFAULT_IMAGE_MODEL.into(),
        }
    }
}

#[async_trait]
impl Tool for GenerateImageTool {
    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Generate an image from a text prompt. Returns the image URL."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "What the image should show"
                },
                "size": {
                    "type": "string",
                    "enum": SIZES,
                    "description": "Image size (default 1024x1024)"
                }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let prompt = arguments["prompt"]
            .as_str()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'prompt' argument".into()))?;
        let size = arguments["size"]
            .as_str()
            .filter(|s| SIZES.contains(s))
            .unwrap_or(SIZES[0]);

        let reply = self
            .api
            .post(
                self.name(),
                "/images/generations",
                serde_json::json!({
                    "model": self.model,
                    "prompt": prompt,
                    "size": size,
                }),
            )
            .await?;

        match reply.pointer("/data/0/url").and_then(|u| u.as_str()) {
            Some(url) => Ok(ToolResult::success(serde_json::json!({
                "url": url,
                "size": size,
            }))),
            None => Ok(ToolResult::failure("Image endpoint returned no URL")),
        }
    }
}
