//! # lightzai Core
//!
//! Domain types, traits, and error definitions for the lightzai chat client.
//! This crate has no I/O of its own. It defines the domain model that the
//! transport, tool and orchestration crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the orchestrator talks to is a trait here
//! (`Transport`, `Tool`, `ApprovalPrompt`). Implementations live in their
//! respective crates, so tests can script any of them.

pub mod approval;
pub mod completion;
pub mod error;
pub mod event;
pub mod message;
pub mod tool;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use approval::{ApprovalDecision, ApprovalPrompt, ApprovalRequest};
pub use completion::{AggregatedResult, Usage};
pub use error::{Error, Result, ToolError, TransportError};
pub use event::{EventSink, StreamEvent, TurnState};
pub use message::{FunctionCall, Message, MessageLog, Role, ToolCallRequest};
pub use tool::{Tool, ToolRegistry, ToolResult};
pub use transport::{
    ByteStream, ChatRequest, ToolDefinition, ToolSchema, Transport, TransportResponse,
};
