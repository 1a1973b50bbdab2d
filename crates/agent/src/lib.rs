//! The conversation loop for lightzai.
//!
//! The orchestrator follows a **Request → Fold → Dispatch** cycle:
//!
//! 1. **Receive** a user message and append it to the log
//! 2. **Send** the log and tool schemas through the transport
//! 3. **Fold** the streamed (or atomic) response into one round result
//! 4. **If tool calls**: run them in order, commit the round, loop to 2
//! 5. **If plain content**: commit the answer and return it
//!
//! The loop ends on a plain answer, a transport failure, cancellation, or
//! the round cap.

pub mod history;
pub mod orchestrator;
pub mod prompt;

pub use history::trim_history;
pub use orchestrator::{DEFAULT_MAX_ROUNDS, DEFAULT_REQUEST_TIMEOUT, Orchestrator};
pub use prompt::system_prompt;
pub use tokio_util::sync::CancellationToken;
