use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::errors::TransportError;
use crate::events::{PermissionResponse, TransportEvent};

/// Ordered event stream for one dispatched turn.
pub type EventStream = Pin<Box<dyn Stream<Item = TransportEvent> + Send>>;

/// Context shipped with a user message when a turn is dispatched.
///
/// `attempt` starts at 1 and increments when the core re-dispatches the same
/// turn after a retryable failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub session_id: String,
    pub turn_id: String,
    pub message: String,
    pub attempt: u32,
}

/// Adapter contract over the agent SDK connection.
///
/// A transport owns exactly one in-flight turn per session; `dispatch` must
/// not be called again until the previous stream has ended.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Send a user message and open the event stream for the resulting turn.
    async fn dispatch(&self, request: TurnRequest) -> Result<EventStream, TransportError>;

    /// Answer an intercepted tool call. The stream stays parked between the
    /// `ToolCallStart` event and this response.
    async fn respond(
        &self,
        call_id: &str,
        response: PermissionResponse,
    ) -> Result<(), TransportError>;

    /// Cooperative stop for an in-flight turn. Tool executions already
    /// running are not torn down; the adapter stops emitting events.
    async fn cancel(&self, turn_id: &str) -> Result<(), TransportError>;
}
