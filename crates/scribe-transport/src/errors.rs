use thiserror::Error;

/// Failures raised by a transport adapter.
///
/// The orchestration core only ever inspects the rendered message text, so
/// adapters should surface the underlying SDK error verbatim rather than
/// rewording it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to establish agent stream: {0}")]
    Connection(String),
    #[error("{0}")]
    Api(String),
    #[error("transport protocol violation: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api(message.into())
    }
}
