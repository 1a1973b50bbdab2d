//! Error types for the lightzai domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. Only transport failures
//! (and the orchestrator's own fatal conditions) ever reach the caller of a
//! turn; everything below the orchestrator is absorbed into tool results.

use thiserror::Error;

/// The top-level error type for all lightzai operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- Turn control ---
    #[error("Turn cancelled")]
    Cancelled,

    #[error("Tool-call loop exceeded {limit} rounds without a final answer")]
    RoundLimitExceeded { limit: u32 },

    // --- Protocol invariants ---
    #[error("Protocol invariant violated: {0}")]
    Protocol(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Transport not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl TransportError {
    /// Whether the provider rejected the call because the account has run
    /// out of credit or resource packages.
    pub fn is_quota_exhausted(&self) -> bool {
        let message = match self {
            Self::Api { message, .. } | Self::RateLimited(message) => message,
            _ => return false,
        };
        let lower = message.to_lowercase();
        lower.contains("insufficient balance") || lower.contains("no resource package")
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
