//! Streaming transport contract for the Scribe agent core.
//!
//! The agent SDK that actually talks to the model is a separate process
//! concern; this crate pins down the boundary the orchestration core
//! consumes: a turn request goes in, an ordered event stream comes out,
//! and permission responses / cancellation flow back. Adapters for a real
//! SDK implement [`Transport`]; tests substitute scripted event sequences.

pub mod errors;
pub mod events;
pub mod transport;

pub use errors::*;
pub use events::*;
pub use transport::*;
