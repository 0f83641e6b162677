//! Session layer over the WebSocket kernel.
//!
//! [`Session`] is a synchronous state machine holding everything scoped to a
//! connection: request correlation, the response cache, the readiness gate,
//! the outgoing buffer and the keep-alive timer. [`SocketClient`] is the
//! cloneable async handle; a background task owns the session and the
//! transport and feeds one event at a time into it.

pub mod buffer;
pub mod builder;
pub mod cache;
pub mod correlator;
pub mod keep_alive;
pub mod orchestrator;
pub mod readiness;
pub mod session;

// Re-export main types for easier importing
pub use builder::SocketBuilder;
pub use cache::ResponseCache;
pub use correlator::{PendingReply, RequestCorrelator, ResponseHandle, Subscription};
pub use orchestrator::SocketClient;
pub use readiness::{GateState, ReadinessGate, ReadinessSignal};
pub use session::{Collaborators, Session};
