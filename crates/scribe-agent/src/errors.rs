use thiserror::Error;

/// Session-level failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Top-level error type for the scribe-agent crate.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("session is closed")]
    SessionClosed,
    #[error("interaction handler failed: {0}")]
    Interaction(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transport(#[from] scribe_transport::TransportError),
}

impl AgentError {
    pub fn session_closed() -> Self {
        Self::SessionClosed
    }
}
