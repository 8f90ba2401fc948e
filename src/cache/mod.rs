//! Cache invalidation for backend resources.
//!
//! The [`CacheInvalidationBridge`] turns server-pushed change events into
//! [`CacheKey`] invalidations. [`ResourceCache`] is the read-through cache
//! those invalidations land in; anything implementing [`CacheInvalidator`]
//! can stand in for it.

pub mod bridge;
pub mod key;
pub mod store;

pub use bridge::{invalidations_for, Alert, CacheInvalidationBridge, CacheInvalidator};
pub use key::CacheKey;
pub use store::ResourceCache;
