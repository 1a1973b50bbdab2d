//! Wiring from configuration to a ready orchestrator.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use lightzai_agent::Orchestrator;
use lightzai_config::AppConfig;
use lightzai_core::approval::ApprovalPrompt;
use lightzai_providers::OpenAiCompatTransport;
use lightzai_tools::ToolSettings;
use tracing::{debug, info};

use crate::Cli;

/// Effective per-run options after CLI flags override the config file.
#[derive(Debug, Clone)]
pub struct Options {
    pub streaming: bool,
    pub tools_enabled: bool,
}

pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load().context("Failed to load config")?;
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(max_rounds) = cli.max_rounds {
        config.max_rounds = max_rounds.max(1);
    }
    if cli.thinking {
        config.thinking = true;
    }

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set the ZAI_API_KEY environment variable, or add");
        eprintln!("    api_key = \"...\"");
        eprintln!("  to {}", AppConfig::config_path().display());
        eprintln!();
        bail!("No API key found. See above for setup instructions.");
    }
    Ok(config)
}

pub fn options(cli: &Cli, config: &AppConfig) -> Options {
    Options {
        streaming: config.stream && !cli.no_stream,
        tools_enabled: config.tools_enabled && !cli.no_tools,
    }
}

/// Tool environment derived from the `[tools]` table.
pub fn tool_settings(config: &AppConfig) -> ToolSettings {
    ToolSettings {
        workspace: config.tools.workspace.clone(),
        forbidden_paths: config.tools.forbidden_paths.clone(),
        shell_timeout: Duration::from_secs(config.tools.shell_timeout_secs),
        max_output_bytes: config.tools.max_output_bytes,
        skills_dir: Some(config.tools.skills_dir.clone()),
        api_base: config.api_base(),
        api_key: config.api_key.clone(),
        http_timeout: config.timeout(),
    }
}

pub fn build(
    config: &AppConfig,
    options: &Options,
    approval: Option<Arc<dyn ApprovalPrompt>>,
) -> anyhow::Result<Orchestrator> {
    let api_key = config.api_key.clone().unwrap_or_default();
    let transport = OpenAiCompatTransport::new("zai", config.chat_endpoint(), api_key)
        .context("Failed to create HTTP transport")?
        .with_timeout(config.timeout());

    let mut dispatcher = lightzai_tools::default_dispatcher(&tool_settings(config));
    if let Some(prompt) = approval {
        dispatcher = dispatcher.with_approval(prompt);
    }

    let mut orchestrator = Orchestrator::new(Arc::new(transport), Arc::new(dispatcher), config.model.clone())
        .with_max_tokens(config.max_tokens)
        .with_temperature(config.temperature)
        .with_streaming(options.streaming)
        .with_thinking(config.thinking)
        .with_max_rounds(config.max_rounds)
        .with_max_history(config.max_history)
        .with_request_timeout(config.timeout());
    if let Some(persona) = &config.system_prompt {
        orchestrator.set_system_prompt(persona.clone());
    }

    info!(
        session = %orchestrator.session_id(),
        model = %config.model,
        endpoint = %config.chat_endpoint(),
        streaming = options.streaming,
        tools = options.tools_enabled,
        "Session ready"
    );
    debug!(tools = ?orchestrator.dispatcher().tool_names(), "Registered tools");
    Ok(orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn tool_settings_follow_config() {
        let mut config = AppConfig::default();
        config.base_url = "proxy.example.com".into();
        config.api_key = Some("k".into());
        config.tools.shell_timeout_secs = 7;

        let settings = tool_settings(&config);
        assert_eq!(settings.api_base, "https://proxy.example.com/api/paas/v4");
        assert_eq!(settings.api_key.as_deref(), Some("k"));
        assert_eq!(settings.shell_timeout, Duration::from_secs(7));
        assert_eq!(settings.skills_dir, Some(config.tools.skills_dir.clone()));
    }

    #[test]
    fn flags_override_config_switches() {
        let config = AppConfig::default();
        let cli = Cli::parse_from(["lightzai", "--no-stream", "--no-tools", "hello"]);
        let options = options(&cli, &config);
        assert!(!options.streaming);
        assert!(!options.tools_enabled);
        assert_eq!(cli.question, vec!["hello"]);

        let cli = Cli::parse_from(["lightzai"]);
        let options = super::options(&cli, &config);
        assert!(options.streaming);
        assert!(options.tools_enabled);
    }
}
