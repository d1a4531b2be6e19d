use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use scribe_transport::SubagentStatus;

use crate::util::epoch_millis;

/// Lifecycle states of a tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Pending,
    Running,
    Success,
    Error,
}

/// Live progress detail for a sub-agent invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubagentProgress {
    pub message: String,
    /// Epoch milliseconds when the sub-agent started.
    pub start_time: u64,
}

/// One tool invocation inside a turn.
///
/// `status` and `subagent_status` are independent axes: for `is_subagent`
/// calls, display and terminality decisions prefer `subagent_status`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub status: ToolCallStatus,
    pub start_time: u64,
    pub end_time: Option<u64>,
    pub is_subagent: bool,
    pub subagent_status: Option<SubagentStatus>,
    pub subagent_progress: Option<SubagentProgress>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        let name = name.into();
        let is_subagent = name == crate::permissions::SUBAGENT_TOOL;
        Self {
            id: id.into(),
            name,
            input,
            output: None,
            error: None,
            status: ToolCallStatus::Pending,
            start_time: epoch_millis(),
            end_time: None,
            is_subagent,
            subagent_status: is_subagent.then_some(SubagentStatus::Starting),
            subagent_progress: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        if self.is_subagent {
            if let Some(status) = self.subagent_status {
                return status.is_terminal();
            }
        }
        matches!(self.status, ToolCallStatus::Success | ToolCallStatus::Error)
    }
}

/// Partial mutation applied through [`ToolCallRegistry::update`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolCallUpdate {
    pub status: Option<ToolCallStatus>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub end_time: Option<u64>,
    pub subagent_status: Option<SubagentStatus>,
    pub subagent_progress: Option<SubagentProgress>,
}

impl ToolCallUpdate {
    pub fn status(status: ToolCallStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn finished(output: Option<Value>, error: Option<String>) -> Self {
        let status = if error.is_some() {
            ToolCallStatus::Error
        } else {
            ToolCallStatus::Success
        };
        Self {
            status: Some(status),
            output,
            error,
            end_time: Some(epoch_millis()),
            ..Self::default()
        }
    }
}

/// Insertion-ordered record of every tool call emitted within a turn.
///
/// Records are never deleted; once terminal they only accept a missing
/// `end_time`.
#[derive(Debug, Default)]
pub struct ToolCallRegistry {
    calls: Vec<ToolCall>,
    index: HashMap<String, usize>,
}

impl ToolCallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, call: ToolCall) {
        self.index.insert(call.id.clone(), self.calls.len());
        self.calls.push(call);
    }

    /// Apply a partial update; returns false for unknown ids or mutations
    /// rejected by the terminal-freeze invariant.
    pub fn update(&mut self, id: &str, update: ToolCallUpdate) -> bool {
        let Some(&slot) = self.index.get(id) else {
            return false;
        };
        let call = &mut self.calls[slot];

        if call.is_terminal() {
            if call.end_time.is_none() {
                if let Some(end_time) = update.end_time {
                    call.end_time = Some(end_time);
                    return true;
                }
            }
            return false;
        }

        if let Some(status) = update.status {
            call.status = status;
        }
        if let Some(output) = update.output {
            call.output = Some(output);
        }
        if let Some(error) = update.error {
            call.error = Some(error);
        }
        if let Some(end_time) = update.end_time {
            call.end_time = Some(end_time);
        }
        if call.is_subagent {
            if let Some(status) = update.subagent_status {
                call.subagent_status = Some(status);
            }
            if let Some(progress) = update.subagent_progress {
                call.subagent_progress = Some(progress);
            }
        }
        true
    }

    pub fn get(&self, id: &str) -> Option<&ToolCall> {
        self.index.get(id).map(|&slot| &self.calls[slot])
    }

    /// All records in insertion order.
    pub fn all(&self) -> &[ToolCall] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
