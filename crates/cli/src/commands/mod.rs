pub mod ask;
pub mod chat;

use lightzai_agent::{CancellationToken, Orchestrator};
use lightzai_core::error::Error;

use crate::render::Printer;

/// Run one turn with live output. Ctrl-C cancels the turn, not the process.
pub async fn turn(orchestrator: &mut Orchestrator, text: &str, tools_enabled: bool) -> lightzai_core::Result<()> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let printer = Printer::spawn();
    let outcome = orchestrator.run_turn(text, tools_enabled, printer.sink(), &cancel).await;
    watcher.abort();
    let streamed = printer.finish().await;

    let answer = outcome?;
    if !streamed {
        println!("{answer}");
    }
    Ok(())
}

/// One-line error report, with a hint when the account is out of credit.
pub fn report(error: &Error) {
    if let Error::Transport(transport) = error
        && transport.is_quota_exhausted()
    {
        eprintln!("error> Out of credit or resource packages.");
        eprintln!("hint> Top up your balance in the Z.AI console, then retry.");
        eprintln!("hint> Check key and endpoint: ZAI_API_KEY, LZAI_BASE_URL, LZAI_API_PREFIX");
        return;
    }
    eprintln!("error> {error}");
}
