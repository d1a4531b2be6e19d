use std::fmt::{self, Display};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::errors::AgentError;
use crate::events::{EventEmitter, SessionEvent};
use crate::queue::{MessageQueue, QueuedMessage};
use crate::registry::{ToolCall, ToolCallRegistry};
use crate::util::epoch_millis;

/// Where the session currently sits in its turn cycle.
///
/// Turn outcomes (completed/aborted/errored) live on [`TurnStatus`]; the
/// phase always returns to `Idle` once a turn reaches a terminal status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Dispatching,
    Streaming,
    AwaitingPermission,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dispatching => "dispatching",
            Self::Streaming => "streaming",
            Self::AwaitingPermission => "awaiting_permission",
        }
    }

    pub fn can_transition_to(&self, next: &SessionPhase) -> bool {
        if self == next {
            return true;
        }

        match self {
            // Idle -> AwaitingPermission covers the pre-dispatch guard.
            Self::Idle => matches!(next, Self::Dispatching | Self::AwaitingPermission),
            Self::Dispatching => matches!(
                next,
                Self::Streaming | Self::AwaitingPermission | Self::Idle
            ),
            // Streaming -> Dispatching is the retry re-dispatch path.
            Self::Streaming => matches!(
                next,
                Self::AwaitingPermission | Self::Dispatching | Self::Idle
            ),
            Self::AwaitingPermission => {
                matches!(next, Self::Streaming | Self::Dispatching | Self::Idle)
            }
        }
    }
}

impl Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome axis of a single turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Running,
    AwaitingPermission,
    Completed,
    Aborted,
    Errored,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::AwaitingPermission => "awaiting_permission",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Errored => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Errored)
    }
}

impl Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request/response cycle with the agent.
#[derive(Debug)]
pub struct Turn {
    pub id: String,
    pub input: String,
    pub status: TurnStatus,
    pub registry: ToolCallRegistry,
    /// Epoch milliseconds.
    pub started_at: u64,
    pub ended_at: Option<u64>,
    pub error: Option<String>,
    /// Dispatch attempts consumed, including retries.
    pub attempts: u32,
    pub cost: f64,
}

impl Turn {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            input: input.into(),
            status: TurnStatus::Running,
            registry: ToolCallRegistry::new(),
            started_at: epoch_millis(),
            ended_at: None,
            error: None,
            attempts: 0,
            cost: 0.0,
        }
    }
}

/// What `submit` did with the message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The message started a turn (and the queue was drained behind it).
    Dispatched,
    /// A turn was in flight; the message waits in the queue.
    Queued(QueuedMessage),
}

/// Read-only view pushed to the UI collaborator on every phase change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: SessionPhase,
    pub turn_count: usize,
    pub spend: f64,
    pub queue_len: usize,
    pub closed: bool,
    pub current_turn: Option<TurnSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnSnapshot {
    pub id: String,
    pub input: String,
    pub status: TurnStatus,
    pub attempts: u32,
    pub tool_calls: Vec<ToolCall>,
}

impl TurnSnapshot {
    pub fn of(turn: &Turn) -> Self {
        Self {
            id: turn.id.clone(),
            input: turn.input.clone(),
            status: turn.status,
            attempts: turn.attempts,
            tool_calls: turn.registry.all().to_vec(),
        }
    }
}

/// Cloneable handle for requesting a cooperative abort from another task.
#[derive(Clone)]
pub struct SessionAbortHandle {
    pub(super) abort_requested: Arc<AtomicBool>,
    pub(super) abort_notify: Arc<Notify>,
}

impl SessionAbortHandle {
    pub fn request_abort(&self) {
        self.abort_requested.store(true, Ordering::SeqCst);
        self.abort_notify.notify_waiters();
    }
}

/// Cloneable handle onto the session's message queue.
///
/// The UI task holds one of these so input submitted while a turn streams
/// can be enqueued without touching the session itself; the session drains
/// the shared queue between turns.
#[derive(Clone)]
pub struct SessionQueueHandle {
    pub(super) session_id: String,
    pub(super) queue: Arc<Mutex<MessageQueue>>,
    pub(super) event_emitter: Arc<dyn EventEmitter>,
}

impl SessionQueueHandle {
    pub fn enqueue(&self, content: impl Into<String>) -> Result<QueuedMessage, AgentError> {
        let (message, queue_len) = {
            let mut queue = self.queue.lock().expect("message queue mutex poisoned");
            (queue.enqueue(content), queue.len())
        };
        self.event_emitter
            .emit(SessionEvent::queue_changed(self.session_id.clone(), queue_len))?;
        Ok(message)
    }

    pub fn remove(&self, id: &str) -> Result<bool, AgentError> {
        let (removed, queue_len) = {
            let mut queue = self.queue.lock().expect("message queue mutex poisoned");
            (queue.remove(id), queue.len())
        };
        if removed {
            self.event_emitter
                .emit(SessionEvent::queue_changed(self.session_id.clone(), queue_len))?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.queue
            .lock()
            .expect("message queue mutex poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_only_enters_dispatching_or_guard_wait() {
        let idle = SessionPhase::Idle;
        assert!(idle.can_transition_to(&SessionPhase::Dispatching));
        assert!(idle.can_transition_to(&SessionPhase::AwaitingPermission));
        assert!(!idle.can_transition_to(&SessionPhase::Streaming));
    }

    #[test]
    fn awaiting_permission_resumes_streaming_or_returns_idle() {
        let waiting = SessionPhase::AwaitingPermission;
        assert!(waiting.can_transition_to(&SessionPhase::Streaming));
        assert!(waiting.can_transition_to(&SessionPhase::Dispatching));
        assert!(waiting.can_transition_to(&SessionPhase::Idle));
    }

    #[test]
    fn self_transition_is_allowed() {
        for phase in [
            SessionPhase::Idle,
            SessionPhase::Dispatching,
            SessionPhase::Streaming,
            SessionPhase::AwaitingPermission,
        ] {
            assert!(phase.can_transition_to(&phase));
        }
    }

    #[test]
    fn turn_status_terminal_partition() {
        assert!(!TurnStatus::Running.is_terminal());
        assert!(!TurnStatus::AwaitingPermission.is_terminal());
        assert!(TurnStatus::Completed.is_terminal());
        assert!(TurnStatus::Aborted.is_terminal());
        assert!(TurnStatus::Errored.is_terminal());
    }

    #[test]
    fn new_turn_starts_running_with_empty_registry() {
        let turn = Turn::new("hello");
        assert_eq!(turn.status, TurnStatus::Running);
        assert!(turn.registry.is_empty());
        assert_eq!(turn.attempts, 0);
        assert!(turn.ended_at.is_none());
    }
}
