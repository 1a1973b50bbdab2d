//! Skill namespace: local scripts exposed as `skill__<name>`.
//!
//! A skill is a `.py`, `.sh` or `.js` file in the skills directory whose
//! leading comment lines declare it:
//!
//! ```text
//! # description: Run the n8n workflow
//! # parameters: {"query": {"type": "string"}}
//! # prompt: [n8n result]\n{{result}}\n\nSummarize this for the user.
//! ```
//!
//! The script receives the call arguments as JSON on stdin and `WORKSPACE`
//! in its environment. Its stdout is the result, wrapped by the prompt
//! template when one is declared. Files named `*.example.*` are skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lightzai_core::error::ToolError;
use lightzai_core::tool::ToolResult;
use lightzai_core::transport::ToolDefinition;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::dispatch::Extension;
use crate::route::Namespace;
use crate::shell::CommandRunner;

/// Header lines scanned for declarations.
const HEADER_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct Skill {
    pub name: String,
    pub path: PathBuf,
    pub interpreter: &'static str,
    pub description: String,
    /// JSON-schema `properties` object.
    pub parameters: serde_json::Value,
    /// Output template containing `{{result}}`.
    pub prompt: Option<String>,
}

impl Skill {
    /// Parse a script file. `None` when the extension is not a known
    /// interpreter or the file is an example.
    pub fn from_file(path: &Path, source: &str) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        if file_name.contains(".example.") {
            return None;
        }
        let interpreter = match path.extension()?.to_str()? {
            "py" => "python3",
            "sh" => "sh",
            "js" => "node",
            _ => return None,
        };
        let name = path.file_stem()?.to_str()?.to_string();

        let mut description = None;
        let mut parameters = serde_json::json!({});
        let mut prompt = None;
        for line in source.lines().take(HEADER_LINES) {
            let Some(body) = comment_body(line) else {
                continue;
            };
            if let Some(value) = header_value(body, "description") {
                description = Some(value.to_string());
            } else if let Some(value) = header_value(body, "parameters") {
                match serde_json::from_str::<serde_json::Value>(value) {
                    Ok(props) if props.is_object() => parameters = props,
                    _ => warn!(skill = %name, "Ignoring unparseable parameters header"),
                }
            } else if let Some(value) = header_value(body, "prompt") {
                prompt = Some(value.replace("\\n", "\n"));
            }
        }

        Some(Self {
            description: description.unwrap_or_else(|| format!("Run the {name} skill")),
            name,
            path: path.to_path_buf(),
            interpreter,
            parameters,
            prompt,
        })
    }

    pub fn to_definition(&self) -> ToolDefinition {
        let properties = if self.parameters.as_object().is_some_and(|p| !p.is_empty()) {
            self.parameters.clone()
        } else {
            serde_json::json!({
                "input": {"type": "string", "description": "Input for the skill"}
            })
        };
        ToolDefinition {
            name: Namespace::Skill.qualify(&self.name),
            description: self.description.clone(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
            }),
        }
    }

    /// Apply the prompt template to raw script output.
    pub fn render(&self, output: &str) -> String {
        match &self.prompt {
            Some(template) if template.contains("{{result}}") => template.replace("{{result}}", output),
            Some(template) => format!("{template}\n{output}"),
            None => output.to_string(),
        }
    }
}

fn comment_body(line: &str) -> Option<&str> {
    let line = line.trim_start();
    line.strip_prefix('#')
        .or_else(|| line.strip_prefix("//"))
        .map(str::trim)
}

fn header_value<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.strip_prefix(key)?.strip_prefix(':').map(str::trim)
}

/// All skills found in a directory.
pub struct SkillSet {
    skills: BTreeMap<String, Skill>,
    runner: Arc<CommandRunner>,
    workspace: Option<PathBuf>,
}

impl SkillSet {
    /// Scan `dir`. A missing directory yields an empty set.
    pub fn load(dir: &Path, runner: Arc<CommandRunner>, workspace: Option<PathBuf>) -> Self {
        let mut skills = BTreeMap::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "No skills directory");
                return Self { skills, runner, workspace };
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Ok(source) = std::fs::read_to_string(&path) else {
                continue;
            };
            if let Some(skill) = Skill::from_file(&path, &source) {
                debug!(skill = %skill.name, "Loaded skill");
                skills.insert(skill.name.clone(), skill);
            }
        }
        Self { skills, runner, workspace }
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

#[async_trait]
impl Extension for SkillSet {
    fn namespace(&self) -> Namespace {
        Namespace::Skill
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.skills.values().map(Skill::to_definition).collect()
    }

    async fn call(&self, target: &str, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let skill = self
            .skills
            .get(target)
            .ok_or_else(|| ToolError::NotFound(Namespace::Skill.qualify(target)))?;

        let mut command = Command::new(skill.interpreter);
        command.arg(&skill.path);
        if let Some(workspace) = &self.workspace {
            command.env("WORKSPACE", workspace);
        }

        let input = serde_json::to_vec(&arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let output = self.runner.run_with_input(&mut command, Some(input)).await?;

        if !output.succeeded() {
            let mut result = output.into_result(self.runner.timeout());
            result.payload.insert("skill".into(), skill.name.clone().into());
            return Ok(result);
        }

        Ok(ToolResult::success(serde_json::json!({
            "skill": skill.name,
            "output": skill.render(output.stdout.trim_end()),
            "truncated": output.truncated,
        })))
    }
}
