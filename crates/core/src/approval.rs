//! Approval gate: explicit yes/no confirmation for privileged tool actions.
//!
//! The gate is an external collaborator. When no prompt is installed the
//! answer is always "no".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the user is being asked to approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// The tool asking for permission
    pub tool: String,

    /// The exact command that will run if approved
    pub command: String,

    /// The model's stated reason, if it gave one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Yes,
    No,
}

impl ApprovalDecision {
    /// Interpret a typed answer. Only an explicit yes approves.
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => Self::Yes,
            _ => Self::No,
        }
    }

    pub fn is_approved(self) -> bool {
        self == Self::Yes
    }
}

/// A channel that can ask a human for confirmation.
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    async fn confirm(&self, request: &ApprovalRequest) -> ApprovalDecision;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_yes_approves() {
        assert!(ApprovalDecision::from_answer("yes").is_approved());
        assert!(ApprovalDecision::from_answer(" Y \n").is_approved());
        assert!(!ApprovalDecision::from_answer("").is_approved());
        assert!(!ApprovalDecision::from_answer("sure").is_approved());
        assert!(!ApprovalDecision::from_answer("no").is_approved());
    }
}
