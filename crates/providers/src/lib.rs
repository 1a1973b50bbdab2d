//! Stream handling and HTTP transport for lightzai.
//!
//! - [`sse`]: raw bytes → `data:` frames
//! - [`aggregate`]: frames → one `AggregatedResult` per round
//! - [`openai_compat`]: the chat-completions `Transport`

pub mod aggregate;
pub mod openai_compat;
pub mod sse;

pub use aggregate::{DeltaAggregator, StreamFolder, from_completion};
pub use openai_compat::OpenAiCompatTransport;
pub use sse::{FrameDecoder, SseEvent, StreamFrame};
