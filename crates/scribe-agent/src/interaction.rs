use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ask::{AskUserQuestion, AskUserReply};
use crate::errors::AgentError;
use crate::permissions::DecisionReason;

/// Operator verdict on a tool call the policy refused to auto-approve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalChoice {
    ApproveOnce,
    ApproveSession,
    ApproveAlways,
    Deny,
}

impl ApprovalChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApproveOnce => "approve-once",
            Self::ApproveSession => "approve-session",
            Self::ApproveAlways => "approve-always",
            Self::Deny => "deny",
        }
    }
}

/// Context shown to the operator when a tool call needs approval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub call_id: String,
    pub tool_name: String,
    pub input: Value,
    pub reason: DecisionReason,
}

/// Why dispatching is blocked pending operator confirmation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "guard", rename_all = "snake_case")]
pub enum GuardReason {
    BudgetExhausted { spent: f64, limit: f64 },
    TurnLimit { turns: usize, limit: usize },
}

/// The human-decision collaborator (approval modal and friends).
///
/// All waits are indefinite; the session imposes no deadline on a human.
#[async_trait]
pub trait InteractionHandler: Send + Sync {
    /// Resolve a denied tool call. Returning an error aborts the turn.
    async fn request_permission(
        &self,
        request: PermissionRequest,
    ) -> Result<ApprovalChoice, AgentError>;

    /// Ask whether to continue past a budget/turn-count guard.
    async fn confirm_continuation(&self, reason: GuardReason) -> Result<bool, AgentError>;

    /// Present a batch of agent questions; replies align by index.
    async fn ask_questions(
        &self,
        questions: &[AskUserQuestion],
    ) -> Result<Vec<AskUserReply>, AgentError>;
}

/// Persistence hook for "always allow" grants, owned by the settings
/// subsystem.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn persist_always_allowed(&self, tool_name: &str) -> Result<(), AgentError>;
}
