//! Path sandbox for the file tools.
//!
//! Relative paths resolve against the workspace root. When a workspace is
//! set every resolved path must stay inside it; forbidden prefixes
//! (`~/.ssh` and friends) are refused either way.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside the workspace")]
    OutsideWorkspace { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Default forbidden prefixes.
pub fn default_forbidden_paths() -> Vec<String> {
    vec![
        "~/.ssh".into(),
        "~/.gnupg".into(),
        "~/.aws".into(),
        "/etc/shadow".into(),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    workspace: Option<PathBuf>,
    forbidden: Vec<String>,
}

impl Sandbox {
    pub fn new(workspace: Option<PathBuf>, forbidden: Vec<String>) -> Self {
        let workspace = workspace.map(|w| w.canonicalize().unwrap_or(w));
        Self { workspace, forbidden }
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    /// Resolve a model-supplied path, or refuse it.
    ///
    /// The target need not exist (writes create it); the deepest existing
    /// ancestor is canonicalized so symlinks cannot escape the workspace.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, PathValidationError> {
        let raw = Path::new(path);
        if raw.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(PathValidationError::PathTraversal { path: path.into() });
        }

        let expanded = PathBuf::from(expand_tilde(path));
        let joined = match &self.workspace {
            Some(root) if expanded.is_relative() => root.join(&expanded),
            _ => expanded,
        };
        let canonical = canonicalize_existing_prefix(&joined).map_err(|reason| {
            PathValidationError::CanonicalizeFailed {
                path: path.into(),
                reason,
            }
        })?;

        for pattern in &self.forbidden {
            let forbidden = PathBuf::from(expand_tilde(pattern));
            let forbidden = forbidden.canonicalize().unwrap_or(forbidden);
            if canonical.starts_with(&forbidden) {
                return Err(PathValidationError::ForbiddenPath {
                    path: path.into(),
                    pattern: pattern.clone(),
                });
            }
        }

        if let Some(root) = &self.workspace
            && !canonical.starts_with(root)
        {
            return Err(PathValidationError::OutsideWorkspace { path: path.into() });
        }

        Ok(canonical)
    }
}

fn canonicalize_existing_prefix(path: &Path) -> Result<PathBuf, String> {
    let mut existing = path;
    let mut rest = Vec::new();
    while !existing.as_os_str().is_empty() && !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(path.to_path_buf()),
        }
    }
    let base = if existing.as_os_str().is_empty() {
        std::env::current_dir().map_err(|e| e.to_string())?
    } else {
        existing.canonicalize().map_err(|e| e.to_string())?
    };
    Ok(rest.into_iter().rev().fold(base, |acc, name| acc.join(name)))
}

/// Expand `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

pub fn home_dir() -> Option<String> {
    std::env::var("HOME").ok().filter(|h| !h.is_empty())
}
