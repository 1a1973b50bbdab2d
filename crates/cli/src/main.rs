//! lightzai CLI: the main entry point.
//!
//! - `lightzai <question...>` asks once and prints the answer
//! - `lightzai` with no question starts the interactive chat

use clap::Parser;

mod approval;
mod commands;
mod render;
mod session;

#[derive(Parser)]
#[command(
    name = "lightzai",
    about = "lightzai: a small Z.AI chat client with streaming and tool calling",
    version
)]
pub struct Cli {
    /// Ask a single question instead of entering interactive mode
    question: Vec<String>,

    /// Wait for whole responses instead of streaming tokens
    #[arg(long)]
    no_stream: bool,

    /// Do not offer tools to the model
    #[arg(long)]
    no_tools: bool,

    /// Ask the model to reason before answering
    #[arg(long)]
    thinking: bool,

    /// Override the configured model
    #[arg(short, long)]
    model: Option<String>,

    /// Maximum request rounds per turn
    #[arg(long)]
    max_rounds: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so answers on stdout stay clean
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let question = cli.question.join(" ").trim().to_string();
    if question.is_empty() {
        commands::chat::run(&cli).await
    } else {
        commands::ask::run(&cli, &question).await
    }
}
