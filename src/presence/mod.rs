//! Chat presence: message history, unread counting and the persisted
//! "last seen" watermark.

pub mod message;
pub mod tracker;
pub mod watermark;

pub use message::ChatMessage;
pub use tracker::{compute_unread, UnreadTracker};
pub use watermark::{watermark_key, FileWatermarkStore, MemoryWatermarkStore, WatermarkStore};
