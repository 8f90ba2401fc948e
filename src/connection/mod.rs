//! Connection management for the realtime channel.
//!
//! One [`ConnectionManager`] owns the single logical channel of a logged-in
//! user: it opens the socket, authenticates, reconnects with bounded
//! exponential backoff and tears everything down on `disconnect()`.
//!
//! # Architecture
//!
//! ```text
//! ConnectionManager
//!     ├── Transport (trait)          ws::WebSocketTransport | memory::MemoryTransport
//!     ├── ReconnectBudget            1s, 2s, 4s ... capped at 30s, 5 attempts
//!     ├── watch::Sender<State>       Idle → Connecting → Open → Closed
//!     └── inbound mpsc<String>       raw text frames, arrival order
//! ```
//!
//! The manager never parses events beyond recognising `auth_ack`; classifying
//! frames is the router's job.

pub mod backoff;
pub mod manager;
pub mod memory;
pub mod transport;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No channel; either never connected or the reconnect budget ran out.
    #[default]
    Idle,
    /// Socket opening, or open and waiting for `auth_ack`, or backing off.
    Connecting,
    /// Authenticated and delivering frames.
    Open,
    /// Explicitly disconnected.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Identity the channel authenticates as (the backend's numeric user id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// Re-exports
pub use backoff::{ReconnectBudget, ReconnectPolicy};
pub use manager::{ConnectionManager, ConnectionManagerBuilder};
pub use memory::{MemoryTransport, ServerEnd};
pub use transport::{FrameSink, FrameSource, Transport};
