use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Progress states reported by a running sub-agent.
///
/// These are a separate axis from the host tool call's own status: a `Task`
/// invocation can be `running` as a tool call while the sub-agent inside it
/// is still `starting` or `thinking`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentStatus {
    Starting,
    Running,
    Thinking,
    Completed,
    Interrupted,
    Error,
}

impl SubagentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Thinking => "thinking",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Error => "error",
        }
    }

    /// Terminal states accept no further progress updates.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted | Self::Error)
    }
}

/// One event in the ordered stream a transport yields for a dispatched turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    TextDelta {
        text: String,
    },
    ToolCallStart {
        call_id: String,
        tool_name: String,
        input: Value,
    },
    ToolCallEnd {
        call_id: String,
        output: Option<Value>,
        error: Option<String>,
    },
    SubagentProgress {
        call_id: String,
        status: SubagentStatus,
        message: Option<String>,
    },
    TurnComplete {
        cost: f64,
    },
    Error {
        message: String,
    },
}

/// Reply the core sends back for an intercepted tool call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PermissionResponse {
    Allow,
    Deny { message: String },
}
