//! `lightzai <question>`: ask once and exit.

use std::io::IsTerminal;
use std::sync::Arc;

use lightzai_core::approval::ApprovalPrompt;

use crate::Cli;
use crate::approval::{StdinApproval, input_lines};
use crate::session;

pub async fn run(cli: &Cli, question: &str) -> anyhow::Result<()> {
    let config = session::load_config(cli)?;
    let options = session::options(cli, &config);

    let approval = std::io::stdin()
        .is_terminal()
        .then(|| Arc::new(StdinApproval::new(input_lines())) as Arc<dyn ApprovalPrompt>);
    let mut orchestrator = session::build(&config, &options, approval)?;

    if let Err(e) = super::turn(&mut orchestrator, question, options.tools_enabled).await {
        super::report(&e);
        std::process::exit(1);
    }
    Ok(())
}
