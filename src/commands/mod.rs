//! CLI subcommand implementations for orderwire.
//!
//! - [`listen`] - Run a live session and print what arrives
//! - [`unread`] - Offline unread count and mark-seen
//!
//! # Usage
//!
//! ```ignore
//! use orderwire::commands;
//!
//! commands::listen::run(&config, UserId(42)).await?;
//! let count = commands::unread::count(&config, UserId(42)).await?;
//! ```

pub mod listen;
pub mod unread;

#[doc(inline)]
pub use unread::{count as unread_count, mark_seen};
