use std::collections::HashSet;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::config::Settings;

/// Tools that only inspect the vault or workspace.
pub const READ_ONLY_TOOLS: &[&str] = &[
    "Read",
    "Glob",
    "Grep",
    "LS",
    "mcp__obsidian__get_active_file",
    "mcp__obsidian__get_vault_stats",
    "mcp__obsidian__get_recent_files",
    "mcp__obsidian__list_commands",
];

/// Workspace UI actions surfaced through the vault bridge.
pub const OBSIDIAN_UI_TOOLS: &[&str] = &[
    "mcp__obsidian__open_file",
    "mcp__obsidian__show_notice",
    "mcp__obsidian__reveal_in_explorer",
    "mcp__obsidian__execute_command",
    "mcp__obsidian__create_note",
];

/// Tools that mutate vault files.
pub const WRITE_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit"];

pub const BASH_TOOL: &str = "Bash";

/// Sub-agent spawn. The spawned agent runs its own permission pass, so the
/// spawn itself is never gated here.
pub const SUBAGENT_TOOL: &str = "Task";

/// Why a tool call was approved or refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    ReadOnly,
    ObsidianUi,
    AlwaysAllowed,
    AutoApproveWrites,
    SessionApproved,
    RequiresWriteApproval,
    BashApprovalDisabled,
    RequiresBashApproval,
    Subagent,
    Default,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::ObsidianUi => "obsidian-ui",
            Self::AlwaysAllowed => "always-allowed",
            Self::AutoApproveWrites => "auto-approve-writes",
            Self::SessionApproved => "session-approved",
            Self::RequiresWriteApproval => "requires-write-approval",
            Self::BashApprovalDisabled => "bash-approval-disabled",
            Self::RequiresBashApproval => "requires-bash-approval",
            Self::Subagent => "subagent",
            Self::Default => "default",
        }
    }
}

impl Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one tool call against the policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub approved: bool,
    pub reason: DecisionReason,
}

impl PermissionDecision {
    fn approve(reason: DecisionReason) -> Self {
        Self {
            approved: true,
            reason,
        }
    }

    fn deny(reason: DecisionReason) -> Self {
        Self {
            approved: false,
            reason,
        }
    }
}

/// Evaluate the permission policy for one tool call.
///
/// Rules are checked in a fixed order and the first match wins. The
/// always-allowed list is deliberately checked before the write/bash rules
/// so a persisted grant overrides the stricter per-call setting.
pub fn decide(
    tool_name: &str,
    settings: &Settings,
    session_approved: &HashSet<String>,
) -> PermissionDecision {
    if READ_ONLY_TOOLS.contains(&tool_name) {
        return PermissionDecision::approve(DecisionReason::ReadOnly);
    }

    if OBSIDIAN_UI_TOOLS.contains(&tool_name) {
        return PermissionDecision::approve(DecisionReason::ObsidianUi);
    }

    if settings
        .always_allowed_tools
        .iter()
        .any(|allowed| allowed == tool_name)
    {
        return PermissionDecision::approve(DecisionReason::AlwaysAllowed);
    }

    if WRITE_TOOLS.contains(&tool_name) {
        if settings.auto_approve_vault_writes {
            return PermissionDecision::approve(DecisionReason::AutoApproveWrites);
        }
        if session_approved.contains(tool_name) {
            return PermissionDecision::approve(DecisionReason::SessionApproved);
        }
        return PermissionDecision::deny(DecisionReason::RequiresWriteApproval);
    }

    if tool_name == BASH_TOOL {
        if !settings.require_bash_approval {
            return PermissionDecision::approve(DecisionReason::BashApprovalDisabled);
        }
        if session_approved.contains(BASH_TOOL) {
            return PermissionDecision::approve(DecisionReason::SessionApproved);
        }
        return PermissionDecision::deny(DecisionReason::RequiresBashApproval);
    }

    if tool_name == SUBAGENT_TOOL {
        return PermissionDecision::approve(DecisionReason::Subagent);
    }

    PermissionDecision::approve(DecisionReason::Default)
}
