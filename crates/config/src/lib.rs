//! Configuration loading, validation, and management for lightzai.
//!
//! Loads configuration from `~/.config/light-zai/config.toml` with
//! environment variable overrides. Token and history limits default to
//! values sized for the machine's memory, so the client stays usable on
//! small ARM boards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.config/light-zai/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bearer token for the chat-completions API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// API host, e.g. `api.z.ai`. A value with a scheme is used verbatim.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path prefix under the host
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Max tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature, clamped to [0, 1]
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Messages kept in the conversation (system message included)
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    #[serde(default = "default_true")]
    pub stream: bool,

    #[serde(default = "default_true")]
    pub tools_enabled: bool,

    /// Ask the model for reasoning output
    #[serde(default)]
    pub thinking: bool,

    /// Tool-call rounds allowed per turn
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Replaces the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Below this the conversation cannot hold a tool round.
pub const MIN_HISTORY: usize = 4;

fn default_model() -> String {
    "glm-5".into()
}
fn default_base_url() -> String {
    "api.z.ai".into()
}
fn default_api_prefix() -> String {
    "/api/paas/v4".into()
}
fn default_max_tokens() -> u32 {
    dynamic_token_limit(detect_total_memory_mb())
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    45
}
fn default_max_history() -> usize {
    dynamic_max_history(detect_total_memory_mb())
}
fn default_max_rounds() -> u32 {
    25
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_prefix", &self.api_prefix)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_history", &self.max_history)
            .field("stream", &self.stream)
            .field("tools_enabled", &self.tools_enabled)
            .field("thinking", &self.thinking)
            .field("max_rounds", &self.max_rounds)
            .field("system_prompt", &self.system_prompt)
            .field("tools", &self.tools)
            .finish()
    }
}

/// `[tools]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_shell_timeout_secs")]
    pub shell_timeout_secs: u64,

    /// Cap per output stream of a command or skill
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Sandbox root for file tools; commands run here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,

    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,

    #[serde(default = "default_skills_dir")]
    pub skills_dir: PathBuf,
}

fn default_shell_timeout_secs() -> u64 {
    30
}
fn default_max_output_bytes() -> usize {
    16 * 1024
}
fn default_forbidden_paths() -> Vec<String> {
    vec![
        "~/.ssh".into(),
        "~/.gnupg".into(),
        "~/.aws".into(),
        "/etc/shadow".into(),
    ]
}
fn default_skills_dir() -> PathBuf {
    AppConfig::config_dir().join("skills")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_timeout_secs: default_shell_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            workspace: None,
            forbidden_paths: default_forbidden_paths(),
            skills_dir: default_skills_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path, then apply environment
    /// overrides:
    /// - `ZAI_API_KEY`, then `LZAI_API_KEY`
    /// - `LZAI_MODEL`, `LZAI_BASE_URL`, `LZAI_API_PREFIX`
    /// - `LZAI_MAX_TOKENS`, `LZAI_TEMPERATURE`, `LZAI_TIMEOUT_SEC`, `LZAI_MAX_HISTORY`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`. Unparseable numbers
    /// keep the current value; non-positive token or timeout values fall
    /// back to the defaults.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = var("ZAI_API_KEY").or_else(|| var("LZAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = var("LZAI_MODEL") {
            self.model = model;
        }
        if let Some(base) = var("LZAI_BASE_URL") {
            self.base_url = base;
        }
        if let Some(prefix) = var("LZAI_API_PREFIX") {
            self.api_prefix = prefix;
        }
        if let Some(tokens) = var("LZAI_MAX_TOKENS").and_then(|v| v.parse::<i64>().ok()) {
            self.max_tokens = u32::try_from(tokens)
                .ok()
                .filter(|t| *t > 0)
                .unwrap_or_else(default_max_tokens);
        }
        if let Some(temperature) = var("LZAI_TEMPERATURE").and_then(|v| v.parse::<f32>().ok()) {
            self.temperature = temperature;
        }
        if let Some(timeout) = var("LZAI_TIMEOUT_SEC").and_then(|v| v.parse::<i64>().ok()) {
            self.timeout_secs = u64::try_from(timeout)
                .ok()
                .filter(|t| *t > 0)
                .unwrap_or_else(default_timeout_secs);
        }
        if let Some(history) = var("LZAI_MAX_HISTORY").and_then(|v| v.parse::<i64>().ok()) {
            self.max_history = usize::try_from(history).unwrap_or(0);
        }
        self.normalize();
    }

    /// Clamp soft limits into range.
    fn normalize(&mut self) {
        if !self.temperature.is_finite() {
            self.temperature = default_temperature();
        }
        self.temperature = self.temperature.clamp(0.0, 1.0);
        self.max_history = self.max_history.max(MIN_HISTORY);
        if self.timeout_secs == 0 {
            self.timeout_secs = default_timeout_secs();
        }
        if self.max_tokens == 0 {
            self.max_tokens = default_max_tokens();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("base_url must not be empty".into()));
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::ValidationError("max_rounds must be at least 1".into()));
        }
        if self.tools.shell_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.shell_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".config").join("light-zai")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// `https://{base_url}{api_prefix}`, or the base verbatim when it
    /// already carries a scheme.
    pub fn api_base(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let prefix = self.api_prefix.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{base}{prefix}")
        } else {
            format!("https://{base}{prefix}")
        }
    }

    pub fn chat_endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            api_prefix: default_api_prefix(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_history: default_max_history(),
            stream: true,
            tools_enabled: true,
            thinking: false,
            max_rounds: default_max_rounds(),
            system_prompt: None,
            tools: ToolsConfig::default(),
        }
    }
}

/// Total RAM in MiB from `/proc/meminfo`; 0 when unknown.
pub fn detect_total_memory_mb() -> u64 {
    std::fs::read_to_string("/proc/meminfo")
        .map(|text| parse_meminfo_mb(&text))
        .unwrap_or(0)
}

fn parse_meminfo_mb(text: &str) -> u64 {
    text.lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kib| kib.parse::<u64>().ok())
        .map(|kib| kib / 1024)
        .unwrap_or(0)
}

/// Response token budget for a machine with `total_mb` of RAM.
pub fn dynamic_token_limit(total_mb: u64) -> u32 {
    match total_mb {
        1..=128 => 1024,
        129..=256 => 2048,
        _ => 4096,
    }
}

/// History length for a machine with `total_mb` of RAM.
pub fn dynamic_max_history(total_mb: u64) -> usize {
    match total_mb {
        1..=128 => 8,
        129..=256 => 12,
        _ => 20,
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
