use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AgentError;
use crate::util::epoch_millis;

pub type EventData = HashMap<String, Value>;

/// Notifications the core pushes to the UI collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStart,
    SessionEnd,
    TurnStart,
    AssistantTextDelta,
    ToolCallStart,
    ToolCallEnd,
    AwaitingPermission,
    PermissionResolved,
    GuardTriggered,
    QueueChanged,
    StateSnapshot,
    TurnComplete,
    TurnAborted,
    TurnErrored,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: EventKind,
    /// Emission time, epoch milliseconds.
    pub timestamp: u64,
    pub session_id: String,
    pub data: EventData,
}

impl SessionEvent {
    pub fn new(kind: EventKind, session_id: String, data: EventData) -> Self {
        Self {
            kind,
            timestamp: epoch_millis(),
            session_id,
            data,
        }
    }

    pub fn turn_start(session_id: String, turn_id: String, input: String) -> Self {
        Self::new(
            EventKind::TurnStart,
            session_id,
            EventData::from([
                ("turn_id".to_string(), Value::String(turn_id)),
                ("input".to_string(), Value::String(input)),
            ]),
        )
    }

    pub fn assistant_text_delta(session_id: String, text: String) -> Self {
        Self::new(
            EventKind::AssistantTextDelta,
            session_id,
            EventData::from([("text".to_string(), Value::String(text))]),
        )
    }

    pub fn tool_call_start(
        session_id: String,
        call_id: String,
        tool_name: String,
        input: Value,
    ) -> Self {
        Self::new(
            EventKind::ToolCallStart,
            session_id,
            EventData::from([
                ("call_id".to_string(), Value::String(call_id)),
                ("tool_name".to_string(), Value::String(tool_name)),
                ("input".to_string(), input),
            ]),
        )
    }

    pub fn tool_call_end(
        session_id: String,
        call_id: String,
        output: Option<Value>,
        error: Option<String>,
    ) -> Self {
        Self::new(
            EventKind::ToolCallEnd,
            session_id,
            EventData::from([
                ("call_id".to_string(), Value::String(call_id)),
                ("output".to_string(), output.unwrap_or(Value::Null)),
                (
                    "error".to_string(),
                    error.map(Value::String).unwrap_or(Value::Null),
                ),
            ]),
        )
    }

    pub fn awaiting_permission(
        session_id: String,
        call_id: String,
        tool_name: String,
        reason: &str,
    ) -> Self {
        Self::new(
            EventKind::AwaitingPermission,
            session_id,
            EventData::from([
                ("call_id".to_string(), Value::String(call_id)),
                ("tool_name".to_string(), Value::String(tool_name)),
                ("reason".to_string(), Value::String(reason.to_string())),
            ]),
        )
    }

    pub fn permission_resolved(
        session_id: String,
        call_id: String,
        approved: bool,
        reason: &str,
    ) -> Self {
        Self::new(
            EventKind::PermissionResolved,
            session_id,
            EventData::from([
                ("call_id".to_string(), Value::String(call_id)),
                ("approved".to_string(), Value::Bool(approved)),
                ("reason".to_string(), Value::String(reason.to_string())),
            ]),
        )
    }

    pub fn guard_triggered(session_id: String, detail: Value) -> Self {
        Self::new(
            EventKind::GuardTriggered,
            session_id,
            EventData::from([("guard".to_string(), detail)]),
        )
    }

    pub fn queue_changed(session_id: String, queue_len: usize) -> Self {
        Self::new(
            EventKind::QueueChanged,
            session_id,
            EventData::from([("queue_len".to_string(), Value::from(queue_len))]),
        )
    }

    pub fn state_snapshot(session_id: String, snapshot: Value) -> Self {
        Self::new(
            EventKind::StateSnapshot,
            session_id,
            EventData::from([("snapshot".to_string(), snapshot)]),
        )
    }

    pub fn turn_complete(session_id: String, turn_id: String, cost: f64) -> Self {
        Self::new(
            EventKind::TurnComplete,
            session_id,
            EventData::from([
                ("turn_id".to_string(), Value::String(turn_id)),
                ("cost".to_string(), Value::from(cost)),
            ]),
        )
    }

    pub fn turn_aborted(session_id: String, turn_id: String) -> Self {
        Self::new(
            EventKind::TurnAborted,
            session_id,
            EventData::from([("turn_id".to_string(), Value::String(turn_id))]),
        )
    }

    pub fn turn_errored(session_id: String, turn_id: String, message: String) -> Self {
        Self::new(
            EventKind::TurnErrored,
            session_id,
            EventData::from([
                ("turn_id".to_string(), Value::String(turn_id)),
                ("message".to_string(), Value::String(message)),
            ]),
        )
    }

    pub fn warning(session_id: String, message: String) -> Self {
        Self::new(
            EventKind::Warning,
            session_id,
            EventData::from([("message".to_string(), Value::String(message))]),
        )
    }

    pub fn error(session_id: String, message: String) -> Self {
        Self::new(
            EventKind::Error,
            session_id,
            EventData::from([("message".to_string(), Value::String(message))]),
        )
    }
}

pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: SessionEvent) -> Result<(), AgentError>;
}

#[derive(Default)]
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _event: SessionEvent) -> Result<(), AgentError> {
        Ok(())
    }
}

/// Collects events for inspection; the UI collaborator in tests.
#[derive(Clone, Default)]
pub struct BufferedEventEmitter {
    inner: Arc<Mutex<Vec<SessionEvent>>>,
}

impl BufferedEventEmitter {
    pub fn snapshot(&self) -> Vec<SessionEvent> {
        let guard = self.inner.lock().expect("buffered emitter mutex poisoned");
        guard.clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.snapshot().into_iter().map(|event| event.kind).collect()
    }
}

impl EventEmitter for BufferedEventEmitter {
    fn emit(&self, event: SessionEvent) -> Result<(), AgentError> {
        let mut guard = self.inner.lock().expect("buffered emitter mutex poisoned");
        guard.push(event);
        Ok(())
    }
}
