//! Tool-name routing.
//!
//! Extension tools are exposed to the model under prefixed names
//! (`mcp__<server>__<tool>`, `skill__<name>`). The name is parsed once into
//! a [`ToolRoute`] at the dispatch boundary.

use std::fmt;

/// Separator between a namespace prefix and its target.
pub const SEPARATOR: &str = "__";

/// Dynamically registered tool families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// External tool servers; target is `<server>__<tool>`.
    Mcp,
    /// Local scripts from the skills directory; target is the skill name.
    Skill,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Mcp, Namespace::Skill];

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Mcp => "mcp",
            Self::Skill => "skill",
        }
    }

    /// The model-facing name for `target` in this namespace.
    pub fn qualify(self, target: &str) -> String {
        format!("{}{SEPARATOR}{target}", self.prefix())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Where a tool name points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRoute {
    Builtin(String),
    Extension { namespace: Namespace, target: String },
}

impl ToolRoute {
    pub fn parse(name: &str) -> Self {
        for namespace in Namespace::ALL {
            let Some(target) = name
                .strip_prefix(namespace.prefix())
                .and_then(|rest| rest.strip_prefix(SEPARATOR))
            else {
                continue;
            };
            let valid = match namespace {
                Namespace::Mcp => target
                    .split_once(SEPARATOR)
                    .is_some_and(|(server, tool)| !server.is_empty() && !tool.is_empty()),
                Namespace::Skill => !target.is_empty(),
            };
            if valid {
                return Self::Extension {
                    namespace,
                    target: target.to_string(),
                };
            }
        }
        Self::Builtin(name.to_string())
    }
}
