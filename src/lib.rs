//! Orderwire - realtime channel for the food-ordering client.
//!
//! Keeps one authenticated WebSocket per logged-in user and turns what the
//! backend pushes over it into cache invalidations, user-facing alerts and
//! an unread chat count.
//!
//! # Architecture
//!
//! - **Connection** - owns the socket, auth handshake and bounded reconnects
//! - **Events** - envelope parsing and type → handler routing
//! - **Cache** - maps resource-change events onto stale cache keys
//! - **Presence** - chat history, unread counting, persisted watermark
//! - **Session** - explicit context wiring the above for one user
//!
//! # Modules
//!
//! - [`connection`] - Connection manager, transports, backoff
//! - [`events`] - Envelopes and the event router
//! - [`cache`] - Invalidation bridge and resource cache
//! - [`presence`] - Unread tracker and watermark stores
//! - [`config`] - Configuration loading/saving

// Library modules
pub mod api;
pub mod cache;
pub mod commands;
pub mod connection;
pub mod events;
pub mod presence;
pub mod session;
pub mod ws;

pub mod config;
pub mod constants;
pub mod env;

// Re-export commonly used types
pub use api::ApiClient;
pub use cache::{Alert, CacheInvalidationBridge, CacheInvalidator, CacheKey, ResourceCache};
pub use config::Config;
pub use connection::{ConnectionManager, ConnectionState, UserId};
pub use events::{ClientMessage, DispatchOutcome, Envelope, EventKind, EventRouter, Route, UpdateKind};
pub use presence::{ChatMessage, FileWatermarkStore, UnreadTracker, WatermarkStore};
pub use session::Session;
pub use ws::WebSocketTransport;
