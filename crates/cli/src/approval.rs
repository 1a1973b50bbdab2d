//! Terminal approval prompt for `confirm_exec`.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use lightzai_core::approval::{ApprovalDecision, ApprovalPrompt, ApprovalRequest};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Stdin lines shared between the REPL and the approval prompt, so neither
/// buffers input the other should see.
pub type InputLines = Arc<Mutex<Lines<BufReader<Stdin>>>>;

pub fn input_lines() -> InputLines {
    Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()))
}

pub struct StdinApproval {
    input: InputLines,
}

impl StdinApproval {
    pub fn new(input: InputLines) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ApprovalPrompt for StdinApproval {
    async fn confirm(&self, request: &ApprovalRequest) -> ApprovalDecision {
        eprintln!();
        eprintln!("  The assistant wants to run:");
        eprintln!("    $ {}", request.command);
        if let Some(reason) = &request.reason {
            eprintln!("  Reason: {reason}");
        }
        eprint!("  Allow? [yes/no] ");
        let _ = std::io::stderr().flush();

        match self.input.lock().await.next_line().await {
            Ok(Some(answer)) => ApprovalDecision::from_answer(&answer),
            _ => ApprovalDecision::No,
        }
    }
}
