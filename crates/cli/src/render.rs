//! Prints turn events as they arrive.

use std::io::Write;

use lightzai_core::event::{EventSink, StreamEvent};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Longest argument preview shown for a tool call.
const ARGUMENT_PREVIEW: usize = 120;

/// A sink plus the task printing what it receives. Drop the sink (via
/// [`Printer::finish`]) to flush and stop the task.
pub struct Printer {
    sink: EventSink,
    task: JoinHandle<bool>,
}

impl Printer {
    pub fn spawn() -> Self {
        let (sink, rx) = EventSink::channel();
        let task = tokio::spawn(print_events(rx));
        Self { sink, task }
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    /// Wait for every event to be printed. Returns whether any answer text
    /// was streamed.
    pub async fn finish(self) -> bool {
        drop(self.sink);
        self.task.await.unwrap_or(false)
    }
}

async fn print_events(mut rx: UnboundedReceiver<StreamEvent>) -> bool {
    let mut stdout = std::io::stdout();
    let mut streamed = false;
    let mut reasoning = false;

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Reasoning { delta } => {
                if !reasoning {
                    eprint!("  [thinking] ");
                    reasoning = true;
                }
                eprint!("{delta}");
            }
            StreamEvent::Content { delta } => {
                if reasoning {
                    eprintln!();
                    reasoning = false;
                }
                print!("{delta}");
                let _ = stdout.flush();
                streamed = true;
            }
            StreamEvent::ToolCall { name, arguments, .. } => {
                if streamed {
                    println!();
                }
                eprintln!("  [tool] {name} {}", preview(&arguments));
            }
            StreamEvent::ToolResult { name, success, .. } => {
                let status = if success { "ok" } else { "failed" };
                eprintln!("  [tool] {name} {status}");
            }
            StreamEvent::Done { .. } => {
                if streamed {
                    println!();
                }
            }
            StreamEvent::StateChanged { .. } | StreamEvent::RoundCompleted { .. } => {}
        }
    }
    streamed
}

fn preview(arguments: &str) -> String {
    let compact: String = arguments.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= ARGUMENT_PREVIEW {
        return compact;
    }
    let cut: String = compact.chars().take(ARGUMENT_PREVIEW).collect();
    format!("{cut}...")
}
