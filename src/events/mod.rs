//! Realtime event envelopes and routing.
//!
//! # Message Flow
//!
//! ```text
//! ConnectionManager ──► raw text frame ──► EventRouter::dispatch
//!                                               │
//!                     Envelope::parse ◄─────────┘
//!                           │
//!               matching handlers, registration order
//!               (cache bridge, unread tracker, UI hooks)
//! ```

pub mod envelope;
pub mod router;

pub use envelope::{is_auth_ack, ClientMessage, Envelope, EventKind, FrameError, UpdateKind};
pub use router::{DispatchOutcome, EventRouter, Handler, Route};

/// Leading `max_chars` characters of `text`, for log lines.
pub(crate) fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
