//! Tool Dispatch Bridge and built-in tools for lightzai.
//!
//! Tools give the model the ability to act: read and write files in the
//! workspace, run shell commands (optionally behind an approval prompt),
//! search and read the web, and generate images. Extension namespaces add
//! MCP server tools and local skill scripts.

pub mod confirm_exec;
pub mod dispatch;
pub mod file_read;
pub mod file_write;
pub mod image;
pub mod list_files;
pub mod mcp;
pub mod path;
pub mod route;
pub mod shell;
pub mod skill;
pub mod web;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lightzai_core::tool::ToolRegistry;

pub use dispatch::{Extension, ToolDispatcher, parse_arguments};
pub use mcp::{McpExtension, McpServer};
pub use route::{Namespace, ToolRoute};
pub use skill::SkillSet;

/// Everything the built-in tools need to know about their environment.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Sandbox root for file tools and working directory for commands.
    pub workspace: Option<PathBuf>,
    pub forbidden_paths: Vec<String>,
    pub shell_timeout: Duration,
    pub max_output_bytes: usize,
    pub skills_dir: Option<PathBuf>,
    /// Prefix for Z.AI tool endpoints, e.g. `https://api.z.ai/api/paas/v4`.
    pub api_base: String,
    pub api_key: Option<String>,
    pub http_timeout: Duration,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            workspace: None,
            forbidden_paths: path::default_forbidden_paths(),
            shell_timeout: shell::DEFAULT_TIMEOUT,
            max_output_bytes: shell::DEFAULT_MAX_OUTPUT_BYTES,
            skills_dir: None,
            api_base: "https://api.z.ai/api/paas/v4".into(),
            api_key: None,
            http_timeout: Duration::from_secs(45),
        }
    }
}

/// Create the registry of built-in tools.
pub fn builtin_registry(settings: &ToolSettings) -> ToolRegistry {
    let sandbox = Arc::new(path::Sandbox::new(
        settings.workspace.clone(),
        settings.forbidden_paths.clone(),
    ));
    let runner = Arc::new(
        shell::CommandRunner::new(settings.shell_timeout, settings.max_output_bytes)
            .with_workdir(sandbox.workspace().map(PathBuf::from)),
    );
    let api = Arc::new(web::ZaiApi::new(
        settings.api_base.clone(),
        settings.api_key.clone(),
        settings.http_timeout,
    ));

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(file_read::FileReadTool::new(Arc::clone(&sandbox))));
    registry.register(Arc::new(file_write::FileWriteTool::new(Arc::clone(&sandbox))));
    registry.register(Arc::new(list_files::ListFilesTool::new(sandbox)));
    registry.register(Arc::new(shell::ExecCommandTool::new(Arc::clone(&runner))));
    registry.register(Arc::new(confirm_exec::ConfirmExecTool::new(runner)));
    registry.register(Arc::new(web::WebSearchTool::new(Arc::clone(&api))));
    registry.register(Arc::new(web::WebReadTool::new(Arc::clone(&api))));
    registry.register(Arc::new(image::GenerateImageTool::new(api)));
    registry
}

/// Built-ins plus the skills found in `settings.skills_dir`.
pub fn default_dispatcher(settings: &ToolSettings) -> ToolDispatcher {
    let mut dispatcher = ToolDispatcher::new(builtin_registry(settings));
    if let Some(dir) = &settings.skills_dir {
        let runner = Arc::new(
            shell::CommandRunner::new(settings.shell_timeout, settings.max_output_bytes)
                .with_workdir(settings.workspace.clone()),
        );
        let skills = SkillSet::load(dir, runner, settings.workspace.clone());
        if !skills.is_empty() {
            dispatcher = dispatcher.with_extension(Arc::new(skills));
        }
    }
    dispatcher
}
