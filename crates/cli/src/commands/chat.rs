//! Interactive chat mode.

use std::io::{IsTerminal, Write};
use std::sync::Arc;

use lightzai_agent::Orchestrator;
use lightzai_core::approval::ApprovalPrompt;

use crate::Cli;
use crate::approval::{InputLines, StdinApproval, input_lines};
use crate::session;

/// What a line typed at the prompt asks for.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Exit,
    Clear,
    ToggleTools,
    Usage,
    Help,
    Unknown(&'a str),
    Say(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(match line {
            "/exit" | "/quit" => Self::Exit,
            "/clear" => Self::Clear,
            "/tools" => Self::ToggleTools,
            "/usage" => Self::Usage,
            "/help" => Self::Help,
            other if other.starts_with('/') => Self::Unknown(other),
            other => Self::Say(other),
        })
    }
}

pub async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = session::load_config(cli)?;
    let mut options = session::options(cli, &config);

    let input = input_lines();
    let approval = std::io::stdin()
        .is_terminal()
        .then(|| Arc::new(StdinApproval::new(Arc::clone(&input))) as Arc<dyn ApprovalPrompt>);
    let mut orchestrator = session::build(&config, &options, approval)?;

    println!();
    println!("  lightzai: interactive mode");
    println!("  Model:     {}", config.model);
    println!("  Endpoint:  {}", config.chat_endpoint());
    println!("  Tools:     {}", tools_label(&orchestrator, options.tools_enabled));
    println!("  Commands:  /exit /clear /tools /usage /help");
    println!();

    while let Some(line) = read_line(&input).await? {
        let Some(command) = Command::parse(&line) else {
            continue;
        };
        match command {
            Command::Exit => break,
            Command::Clear => {
                orchestrator.clear();
                println!("  Conversation cleared.");
            }
            Command::ToggleTools => {
                options.tools_enabled = !options.tools_enabled;
                println!("  Tools: {}", tools_label(&orchestrator, options.tools_enabled));
            }
            Command::Usage => match orchestrator.last_usage() {
                Some(usage) => println!(
                    "  Tokens: {} prompt + {} completion = {} total",
                    usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
                ),
                None => println!("  No usage reported yet."),
            },
            Command::Help => {
                println!("  /exit, /quit  leave");
                println!("  /clear        forget the conversation");
                println!("  /tools        toggle tool calling");
                println!("  /usage        token usage of the last response");
            }
            Command::Unknown(other) => println!("  Unknown command: {other}"),
            Command::Say(text) => {
                if let Err(e) = super::turn(&mut orchestrator, text, options.tools_enabled).await {
                    super::report(&e);
                }
                println!();
            }
        }
    }

    println!("  Goodbye!");
    Ok(())
}

/// Prompt and read one line. `None` on end of input or Ctrl-C.
async fn read_line(input: &InputLines) -> anyhow::Result<Option<String>> {
    print!("you> ");
    std::io::stdout().flush()?;

    let mut lines = input.lock().await;
    tokio::select! {
        line = lines.next_line() => Ok(line?),
        _ = tokio::signal::ctrl_c() => {
            println!();
            Ok(None)
        }
    }
}

fn tools_label(orchestrator: &Orchestrator, enabled: bool) -> String {
    if !enabled {
        return "off".into();
    }
    format!("on ({})", orchestrator.dispatcher().tool_names().join(", "))
}
