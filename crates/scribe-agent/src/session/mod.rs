use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use scribe_transport::{
    EventStream, PermissionResponse, SubagentStatus, Transport, TransportEvent, TurnRequest,
};

use crate::classify::classify_error;
use crate::config::SettingsSource;
use crate::errors::{AgentError, SessionError};
use crate::events::{EventData, EventEmitter, EventKind, NoopEventEmitter, SessionEvent};
use crate::interaction::{
    ApprovalChoice, GuardReason, InteractionHandler, PermissionRequest, SettingsStore,
};
use crate::permissions::decide;
use crate::queue::{MessageQueue, QueuedMessage};
use crate::registry::{SubagentProgress, ToolCall, ToolCallStatus, ToolCallUpdate};
use crate::util::epoch_millis;

mod retry;
mod types;
pub use retry::{RetryBackoffConfig, RetryPolicy, delay_for_attempt_ms};
use retry::jitter_seed_for;
pub use types::{
    SessionAbortHandle, SessionPhase, SessionQueueHandle, SessionSnapshot, SubmitOutcome, Turn,
    TurnSnapshot, TurnStatus,
};

/// Refusal forwarded to the agent when the operator denies a tool call.
pub const PERMISSION_REFUSAL: &str = "The user declined to allow this tool call.";

const DISCARDED_ON_ABORT: &str = "Discarded: turn aborted while awaiting permission.";

enum StreamOutcome {
    Completed { cost: f64 },
    Aborted,
    Errored { message: String },
}

/// Resolves once an abort has been requested, whether the request lands
/// before or after this future is polled.
async fn wait_for_abort(abort_requested: Arc<AtomicBool>, abort_notify: Arc<Notify>) {
    loop {
        if abort_requested.load(Ordering::SeqCst) {
            return;
        }
        let notified = abort_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        // Re-check after registration: notify_waiters only wakes waiters
        // that are already registered.
        if abort_requested.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }
}

/// The turn state machine.
///
/// Owns every piece of mutable session state — the turn list, the message
/// queue, the session-approved tool set, cumulative spend — and mutates it
/// only through the transitions driven by collaborator callbacks. Exactly
/// one turn is in flight at a time; messages submitted meanwhile wait in
/// the queue and drain with no idle gap once the turn completes.
pub struct Session {
    id: String,
    transport: Arc<dyn Transport>,
    settings: Arc<dyn SettingsSource>,
    interaction: Arc<dyn InteractionHandler>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    event_emitter: Arc<dyn EventEmitter>,
    retry: RetryPolicy,
    phase: SessionPhase,
    turns: Vec<Turn>,
    queue: Arc<Mutex<MessageQueue>>,
    session_approved_tools: HashSet<String>,
    spend: f64,
    closed: bool,
    abort_requested: Arc<AtomicBool>,
    abort_notify: Arc<Notify>,
}

impl Session {
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: Arc<dyn SettingsSource>,
        interaction: Arc<dyn InteractionHandler>,
    ) -> Result<Self, AgentError> {
        Self::new_with_emitter(transport, settings, interaction, Arc::new(NoopEventEmitter))
    }

    pub fn new_with_emitter(
        transport: Arc<dyn Transport>,
        settings: Arc<dyn SettingsSource>,
        interaction: Arc<dyn InteractionHandler>,
        event_emitter: Arc<dyn EventEmitter>,
    ) -> Result<Self, AgentError> {
        let session = Self {
            id: Uuid::new_v4().to_string(),
            transport,
            settings,
            interaction,
            settings_store: None,
            event_emitter,
            retry: RetryPolicy::default(),
            phase: SessionPhase::Idle,
            turns: Vec::new(),
            queue: Arc::new(Mutex::new(MessageQueue::new())),
            session_approved_tools: HashSet::new(),
            spend: 0.0,
            closed: false,
            abort_requested: Arc::new(AtomicBool::new(false)),
            abort_notify: Arc::new(Notify::new()),
        };
        session.emit(EventKind::SessionStart, EventData::new())?;
        Ok(session)
    }

    pub fn set_settings_store(&mut self, store: Option<Arc<dyn SettingsStore>>) {
        self.settings_store = store;
    }

    pub fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.retry = policy;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn spend(&self) -> f64 {
        self.spend
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn current_turn(&self) -> Option<&Turn> {
        self.turns.last().filter(|turn| !turn.status.is_terminal())
    }

    pub fn session_approved_tools(&self) -> &HashSet<String> {
        &self.session_approved_tools
    }

    pub fn queued_messages(&self) -> Vec<QueuedMessage> {
        self.lock_queue().iter().cloned().collect()
    }

    /// Drop one queued message before it dispatches.
    pub fn remove_queued(&mut self, id: &str) -> Result<bool, AgentError> {
        self.queue_handle().remove(id)
    }

    /// Handle the UI task uses to enqueue input while a turn is in flight.
    pub fn queue_handle(&self) -> SessionQueueHandle {
        SessionQueueHandle {
            session_id: self.id.clone(),
            queue: self.queue.clone(),
            event_emitter: self.event_emitter.clone(),
        }
    }

    pub fn abort_handle(&self) -> SessionAbortHandle {
        SessionAbortHandle {
            abort_requested: self.abort_requested.clone(),
            abort_notify: self.abort_notify.clone(),
        }
    }

    pub fn request_abort(&self) {
        self.abort_handle().request_abort();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            phase: self.phase,
            turn_count: self.turns.len(),
            spend: self.spend,
            queue_len: self.lock_queue().len(),
            closed: self.closed,
            current_turn: self.current_turn().map(TurnSnapshot::of),
        }
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, MessageQueue> {
        self.queue.lock().expect("message queue mutex poisoned")
    }

    /// Start over: clears turns, spend, queue, and session approvals.
    pub fn reset(&mut self) -> Result<(), AgentError> {
        self.turns.clear();
        *self.lock_queue() = MessageQueue::new();
        self.session_approved_tools.clear();
        self.spend = 0.0;
        self.phase = SessionPhase::Idle;
        self.clear_abort();
        self.emit(EventKind::StateSnapshot, EventData::new())?;
        Ok(())
    }

    /// Mark the session terminal; further submits are rejected.
    pub fn close(&mut self) -> Result<(), AgentError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.emit(EventKind::SessionEnd, EventData::new())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Submit operator input. Dispatches immediately when idle, otherwise
    /// enqueues behind the in-flight turn.
    pub async fn submit(&mut self, content: impl Into<String>) -> Result<SubmitOutcome, AgentError> {
        if self.closed {
            return Err(AgentError::session_closed());
        }
        let content = content.into();

        if self.phase != SessionPhase::Idle {
            return Ok(SubmitOutcome::Queued(self.queue_handle().enqueue(content)?));
        }

        self.run_dispatch_loop(content).await?;
        Ok(SubmitOutcome::Dispatched)
    }

    async fn run_dispatch_loop(&mut self, first: String) -> Result<(), AgentError> {
        let mut pending = VecDeque::from([first]);

        while let Some(input) = pending.pop_front() {
            if !self.pass_dispatch_guard().await? {
                // Operator cancelled at the guard: the queue is discarded
                // without dispatching.
                let queue_len = {
                    let mut queue = self.lock_queue();
                    while queue.dequeue().is_some() {}
                    queue.len()
                };
                self.event_emitter
                    .emit(SessionEvent::queue_changed(self.id.clone(), queue_len))?;
                self.clear_abort();
                self.transition_to(SessionPhase::Idle)?;
                return Ok(());
            }

            let status = self.run_turn(input).await?;
            self.transition_to(SessionPhase::Idle)?;

            if status != TurnStatus::Completed {
                // Errored/aborted turns stop the drain; queued messages stay
                // for the operator to re-dispatch or remove.
                break;
            }

            let next = {
                let mut queue = self.lock_queue();
                queue.dequeue().map(|message| (message, queue.len()))
            };
            if let Some((message, queue_len)) = next {
                self.event_emitter
                    .emit(SessionEvent::queue_changed(self.id.clone(), queue_len))?;
                pending.push_back(message.content);
            }
        }

        Ok(())
    }

    /// Budget/turn-count guard, checked before every dispatch. Returns
    /// false when the operator declines to continue.
    async fn pass_dispatch_guard(&mut self) -> Result<bool, AgentError> {
        let settings = self.settings.snapshot();

        let guard = {
            let mut guard = None;
            if settings.max_budget_per_session > 0.0 && self.spend >= settings.max_budget_per_session
            {
                guard = Some(GuardReason::BudgetExhausted {
                    spent: self.spend,
                    limit: settings.max_budget_per_session,
                });
            } else if settings.max_turns > 0 && self.turns.len() >= settings.max_turns {
                guard = Some(GuardReason::TurnLimit {
                    turns: self.turns.len(),
                    limit: settings.max_turns,
                });
            }
            guard
        };

        let Some(reason) = guard else {
            self.transition_to(SessionPhase::Dispatching)?;
            return Ok(true);
        };

        self.event_emitter.emit(SessionEvent::guard_triggered(
            self.id.clone(),
            serde_json::to_value(&reason).unwrap_or(Value::Null),
        ))?;
        self.transition_to(SessionPhase::AwaitingPermission)?;

        let interaction = self.interaction.clone();
        let aborted = wait_for_abort(self.abort_requested.clone(), self.abort_notify.clone());
        let confirm = interaction.confirm_continuation(reason);
        tokio::pin!(confirm, aborted);
        let confirmed = tokio::select! {
            result = &mut confirm => result?,
            _ = &mut aborted => false,
        };

        if confirmed {
            self.transition_to(SessionPhase::Dispatching)?;
        }
        Ok(confirmed)
    }

    async fn run_turn(&mut self, input: String) -> Result<TurnStatus, AgentError> {
        let turn = Turn::new(input.clone());
        let turn_id = turn.id.clone();
        self.turns.push(turn);
        self.event_emitter.emit(SessionEvent::turn_start(
            self.id.clone(),
            turn_id.clone(),
            input.clone(),
        ))?;

        let jitter_seed = jitter_seed_for(&turn_id);
        let mut attempt: u32 = 1;
        loop {
            if self.is_abort_requested() {
                return self.finish_aborted().await;
            }
            self.current_turn_mut().attempts = attempt;

            let request = TurnRequest {
                session_id: self.id.clone(),
                turn_id: turn_id.clone(),
                message: input.clone(),
                attempt,
            };
            let transport = self.transport.clone();
            let aborted = wait_for_abort(self.abort_requested.clone(), self.abort_notify.clone());
            let dispatch = transport.dispatch(request);
            tokio::pin!(dispatch, aborted);
            let dispatched = tokio::select! {
                result = &mut dispatch => Some(result),
                _ = &mut aborted => None,
            };
            let Some(dispatched) = dispatched else {
                return self.finish_aborted().await;
            };

            let outcome = match dispatched {
                Ok(stream) => {
                    self.transition_to(SessionPhase::Streaming)?;
                    self.consume_stream(stream).await?
                }
                Err(error) => StreamOutcome::Errored {
                    message: error.to_string(),
                },
            };

            match outcome {
                StreamOutcome::Completed { cost } => return self.finish_completed(cost),
                StreamOutcome::Aborted => return self.finish_aborted().await,
                StreamOutcome::Errored { message } => {
                    let category = classify_error(&message);
                    if !category.is_retryable() || attempt >= self.retry.max_attempts {
                        return self.finish_errored(message);
                    }

                    // Retries stay quiet; only exhaustion surfaces an error.
                    self.event_emitter.emit(SessionEvent::warning(
                        self.id.clone(),
                        format!(
                            "attempt {attempt} failed ({}): {message}; retrying",
                            category.as_str()
                        ),
                    ))?;
                    let delay = delay_for_attempt_ms(attempt, &self.retry.backoff, jitter_seed);
                    let aborted =
                        wait_for_abort(self.abort_requested.clone(), self.abort_notify.clone());
                    let sleep = tokio::time::sleep(Duration::from_millis(delay));
                    tokio::pin!(sleep, aborted);
                    let slept = tokio::select! {
                        _ = &mut sleep => true,
                        _ = &mut aborted => false,
                    };
                    if !slept {
                        return self.finish_aborted().await;
                    }
                    attempt += 1;
                    self.transition_to(SessionPhase::Dispatching)?;
                }
            }
        }
    }

    async fn consume_stream(&mut self, mut stream: EventStream) -> Result<StreamOutcome, AgentError> {
        loop {
            if self.is_abort_requested() {
                return Ok(StreamOutcome::Aborted);
            }

            let aborted = wait_for_abort(self.abort_requested.clone(), self.abort_notify.clone());
            tokio::pin!(aborted);
            let next = tokio::select! {
                event = stream.next() => Some(event),
                _ = &mut aborted => None,
            };
            let Some(event) = next else {
                return Ok(StreamOutcome::Aborted);
            };
            let Some(event) = event else {
                return Ok(StreamOutcome::Errored {
                    message: "transport stream ended without completing the turn".to_string(),
                });
            };

            match event {
                TransportEvent::TextDelta { text } => {
                    self.event_emitter
                        .emit(SessionEvent::assistant_text_delta(self.id.clone(), text))?;
                }
                TransportEvent::ToolCallStart {
                    call_id,
                    tool_name,
                    input,
                } => {
                    if !self.handle_tool_call_start(call_id, tool_name, input).await? {
                        return Ok(StreamOutcome::Aborted);
                    }
                }
                TransportEvent::ToolCallEnd {
                    call_id,
                    output,
                    error,
                } => {
                    self.handle_tool_call_end(call_id, output, error)?;
                }
                TransportEvent::SubagentProgress {
                    call_id,
                    status,
                    message,
                } => {
                    self.handle_subagent_progress(&call_id, status, message);
                }
                TransportEvent::TurnComplete { cost } => {
                    return Ok(StreamOutcome::Completed { cost });
                }
                TransportEvent::Error { message } => {
                    return Ok(StreamOutcome::Errored { message });
                }
            }
        }
    }

    /// Register the call, run the permission policy, and either resume the
    /// stream or suspend for a human decision. Returns false when the turn
    /// was aborted while suspended.
    async fn handle_tool_call_start(
        &mut self,
        call_id: String,
        tool_name: String,
        input: Value,
    ) -> Result<bool, AgentError> {
        self.current_turn_mut()
            .registry
            .start(ToolCall::new(call_id.clone(), tool_name.clone(), input.clone()));
        self.event_emitter.emit(SessionEvent::tool_call_start(
            self.id.clone(),
            call_id.clone(),
            tool_name.clone(),
            input.clone(),
        ))?;

        let decision = decide(
            &tool_name,
            &self.settings.snapshot(),
            &self.session_approved_tools,
        );
        if decision.approved {
            self.approve_tool_call(&call_id, decision.reason.as_str())
                .await?;
            return Ok(true);
        }

        self.transition_to(SessionPhase::AwaitingPermission)?;
        self.current_turn_mut().status = TurnStatus::AwaitingPermission;
        self.event_emitter.emit(SessionEvent::awaiting_permission(
            self.id.clone(),
            call_id.clone(),
            tool_name.clone(),
            decision.reason.as_str(),
        ))?;

        let interaction = self.interaction.clone();
        let aborted = wait_for_abort(self.abort_requested.clone(), self.abort_notify.clone());
        let request = PermissionRequest {
            call_id: call_id.clone(),
            tool_name: tool_name.clone(),
            input,
            reason: decision.reason,
        };
        let prompt = interaction.request_permission(request);
        tokio::pin!(prompt, aborted);
        let choice = tokio::select! {
            choice = &mut prompt => Some(choice?),
            _ = &mut aborted => None,
        };
        let Some(choice) = choice else {
            // The suspended call is discarded, never executed.
            self.current_turn_mut().registry.update(
                &call_id,
                ToolCallUpdate::finished(None, Some(DISCARDED_ON_ABORT.to_string())),
            );
            return Ok(false);
        };

        if choice == ApprovalChoice::Deny {
            self.current_turn_mut().registry.update(
                &call_id,
                ToolCallUpdate::finished(None, Some(PERMISSION_REFUSAL.to_string())),
            );
            self.event_emitter.emit(SessionEvent::permission_resolved(
                self.id.clone(),
                call_id.clone(),
                false,
                choice.as_str(),
            ))?;
            self.event_emitter.emit(SessionEvent::tool_call_end(
                self.id.clone(),
                call_id.clone(),
                None,
                Some(PERMISSION_REFUSAL.to_string()),
            ))?;
            // The agent sees the refusal as tool output and decides whether
            // to continue; the turn itself is not an error.
            self.transport
                .respond(
                    &call_id,
                    PermissionResponse::Deny {
                        message: PERMISSION_REFUSAL.to_string(),
                    },
                )
                .await?;
            self.transition_to(SessionPhase::Streaming)?;
            self.current_turn_mut().status = TurnStatus::Running;
            return Ok(true);
        }

        match choice {
            ApprovalChoice::ApproveSession => {
                self.session_approved_tools.insert(tool_name.clone());
            }
            ApprovalChoice::ApproveAlways => {
                self.session_approved_tools.insert(tool_name.clone());
                if let Some(store) = self.settings_store.clone() {
                    if let Err(error) = store.persist_always_allowed(&tool_name).await {
                        self.event_emitter.emit(SessionEvent::warning(
                            self.id.clone(),
                            format!("failed to persist always-allow for '{tool_name}': {error}"),
                        ))?;
                    }
                }
            }
            ApprovalChoice::ApproveOnce | ApprovalChoice::Deny => {}
        }

        self.transition_to(SessionPhase::Streaming)?;
        self.current_turn_mut().status = TurnStatus::Running;
        self.approve_tool_call(&call_id, choice.as_str()).await?;
        Ok(true)
    }

    async fn approve_tool_call(&mut self, call_id: &str, reason: &str) -> Result<(), AgentError> {
        self.current_turn_mut()
            .registry
            .update(call_id, ToolCallUpdate::status(ToolCallStatus::Running));
        self.event_emitter.emit(SessionEvent::permission_resolved(
            self.id.clone(),
            call_id.to_string(),
            true,
            reason,
        ))?;
        self.transport
            .respond(call_id, PermissionResponse::Allow)
            .await?;
        Ok(())
    }

    fn handle_tool_call_end(
        &mut self,
        call_id: String,
        output: Option<Value>,
        error: Option<String>,
    ) -> Result<(), AgentError> {
        let mut update = ToolCallUpdate::finished(output.clone(), error.clone());
        let is_subagent = self
            .current_turn()
            .and_then(|turn| turn.registry.get(&call_id))
            .is_some_and(|call| call.is_subagent);
        if is_subagent {
            update.subagent_status = Some(if error.is_some() {
                SubagentStatus::Error
            } else {
                SubagentStatus::Completed
            });
        }
        self.current_turn_mut().registry.update(&call_id, update);
        self.event_emitter.emit(SessionEvent::tool_call_end(
            self.id.clone(),
            call_id,
            output,
            error,
        ))?;
        Ok(())
    }

    fn handle_subagent_progress(
        &mut self,
        call_id: &str,
        status: SubagentStatus,
        message: Option<String>,
    ) {
        let Some(existing) = self
            .current_turn()
            .and_then(|turn| turn.registry.get(call_id))
        else {
            return;
        };
        let start_time = existing
            .subagent_progress
            .as_ref()
            .map(|progress| progress.start_time)
            .unwrap_or(existing.start_time);

        let update = ToolCallUpdate {
            subagent_status: Some(status),
            subagent_progress: message.map(|message| SubagentProgress {
                message,
                start_time,
            }),
            ..ToolCallUpdate::default()
        };
        self.current_turn_mut().registry.update(call_id, update);
    }

    fn finish_completed(&mut self, cost: f64) -> Result<TurnStatus, AgentError> {
        self.spend += cost;
        let turn = self.current_turn_mut();
        turn.status = TurnStatus::Completed;
        turn.cost = cost;
        turn.ended_at = Some(epoch_millis());
        let turn_id = turn.id.clone();
        self.event_emitter
            .emit(SessionEvent::turn_complete(self.id.clone(), turn_id, cost))?;
        Ok(TurnStatus::Completed)
    }

    async fn finish_aborted(&mut self) -> Result<TurnStatus, AgentError> {
        let turn_id = self.current_turn_mut().id.clone();
        // Cooperative: in-flight tool executions finish on their own; the
        // transport just stops emitting events for this turn.
        let _ = self.transport.cancel(&turn_id).await;

        let interrupted: Vec<String> = self
            .current_turn_mut()
            .registry
            .all()
            .iter()
            .filter(|call| call.is_subagent && !call.is_terminal())
            .map(|call| call.id.clone())
            .collect();
        for call_id in interrupted {
            self.current_turn_mut().registry.update(
                &call_id,
                ToolCallUpdate {
                    subagent_status: Some(SubagentStatus::Interrupted),
                    end_time: Some(epoch_millis()),
                    ..ToolCallUpdate::default()
                },
            );
        }

        let turn = self.current_turn_mut();
        turn.status = TurnStatus::Aborted;
        turn.ended_at = Some(epoch_millis());
        self.clear_abort();
        self.event_emitter
            .emit(SessionEvent::turn_aborted(self.id.clone(), turn_id))?;
        Ok(TurnStatus::Aborted)
    }

    fn finish_errored(&mut self, message: String) -> Result<TurnStatus, AgentError> {
        let turn = self.current_turn_mut();
        turn.status = TurnStatus::Errored;
        turn.error = Some(message.clone());
        turn.ended_at = Some(epoch_millis());
        let turn_id = turn.id.clone();
        self.event_emitter.emit(SessionEvent::turn_errored(
            self.id.clone(),
            turn_id,
            message,
        ))?;
        Ok(TurnStatus::Errored)
    }

    fn transition_to(&mut self, next: SessionPhase) -> Result<(), AgentError> {
        if !self.phase.can_transition_to(&next) {
            return Err(SessionError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        if self.phase == next {
            return Ok(());
        }
        self.phase = next;
        let snapshot = serde_json::to_value(self.snapshot()).unwrap_or(Value::Null);
        self.event_emitter
            .emit(SessionEvent::state_snapshot(self.id.clone(), snapshot))
    }

    fn current_turn_mut(&mut self) -> &mut Turn {
        self.turns
            .last_mut()
            .expect("a turn is active while the session is dispatching")
    }

    fn is_abort_requested(&self) -> bool {
        self.abort_requested.load(Ordering::SeqCst)
    }

    fn clear_abort(&self) {
        self.abort_requested.store(false, Ordering::SeqCst);
    }

    fn emit(&self, kind: EventKind, data: EventData) -> Result<(), AgentError> {
        self.event_emitter
            .emit(SessionEvent::new(kind, self.id.clone(), data))
    }
}
