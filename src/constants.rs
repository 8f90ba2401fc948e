//! Application-wide constants for orderwire.
//!
//! Defaults for the realtime channel live here so the config layer, the
//! connection manager and the tests agree on the same numbers.
//!
//! # Categories
//!
//! - **Endpoint**: where the realtime socket lives
//! - **Reconnect**: backoff schedule and attempt budget
//! - **Timeouts**: handshake and HTTP limits
//! - **Storage**: local persisted state

use std::time::Duration;

// ============================================================================
// Endpoint
// ============================================================================

/// Path of the realtime WebSocket endpoint on the backend.
pub const WS_PATH: &str = "/ws";

/// Default backend URL when no config file or env override is present.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

// ============================================================================
// Reconnect
// ============================================================================

/// Delay before the first reconnect attempt.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(1000);

/// Ceiling for the doubling reconnect delay.
pub const MAX_BACKOFF: Duration = Duration::from_millis(30_000);

/// Reconnect attempts allowed before the manager parks in `Idle`.
///
/// A fresh `connect()` (e.g. after re-login) restores the full budget.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

// ============================================================================
// Timeouts
// ============================================================================

/// How long to wait for `auth_ack` after the socket opens.
///
/// A socket that opens but never acknowledges counts as a failed open.
pub const AUTH_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client request timeout for REST refetches.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Storage
// ============================================================================

/// File (inside the state dir) holding per-user chat watermarks.
pub const WATERMARK_FILE: &str = "watermarks.json";

/// Key prefix for the per-user chat watermark entry.
pub const WATERMARK_KEY_PREFIX: &str = "chat_last_seen_";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_bounds_are_ordered() {
        assert!(INITIAL_BACKOFF < MAX_BACKOFF);
        assert!(MAX_RECONNECT_ATTEMPTS > 0);
    }

    #[test]
    fn test_ws_path_is_absolute() {
        assert!(WS_PATH.starts_with('/'));
    }
}
