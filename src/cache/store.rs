//! Read-through resource cache.
//!
//! Holds the last fetched JSON for each [`CacheKey`]. Invalidation only flips
//! a stale flag; the next `get()` refetches through the [`ApiClient`].
//! Listeners can follow invalidations through [`ResourceCache::subscribe`]
//! to refetch eagerly.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::broadcast;

use super::bridge::CacheInvalidator;
use super::key::CacheKey;
use crate::api::ApiClient;

/// Capacity of the invalidation broadcast; slow listeners see `Lagged`.
const INVALIDATION_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Entry {
    value: Option<Value>,
    stale: bool,
    /// Bumped on every invalidation so a fetch that raced one stays stale.
    generation: u64,
}

/// Cached backend resources keyed by [`CacheKey`].
#[derive(Debug)]
pub struct ResourceCache {
    api: ApiClient,
    entries: Mutex<HashMap<CacheKey, Entry>>,
    invalidated_tx: broadcast::Sender<CacheKey>,
}

impl ResourceCache {
    /// Empty cache reading through `api`.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let (invalidated_tx, _) = broadcast::channel(INVALIDATION_CAPACITY);
        Self {
            api,
            entries: Mutex::new(HashMap::new()),
            invalidated_tx,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh value for `key`, refetching when missing or stale.
    ///
    /// A failed fetch is returned to the caller and the entry stays stale.
    pub async fn get(&self, key: &CacheKey) -> Result<Value> {
        let generation = {
            let entries = self.entries();
            match entries.get(key) {
                Some(Entry {
                    value: Some(value),
                    stale: false,
                    ..
                }) => return Ok(value.clone()),
                Some(entry) => entry.generation,
                None => 0,
            }
        };

        log::debug!("[Cache] Fetching {}", key);
        let value = self
            .api
            .fetch_resource(key)
            .await
            .with_context(|| format!("Failed to refresh {key}"))?;

        let mut entries = self.entries();
        let entry = entries.entry(key.clone()).or_default();
        entry.value = Some(value.clone());
        entry.stale = entry.generation != generation;
        if entry.stale {
            log::debug!("[Cache] {} invalidated during fetch, keeping it stale", key);
        }
        Ok(value)
    }

    /// Last fetched value, fresh or not.
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<Value> {
        self.entries().get(key).and_then(|entry| entry.value.clone())
    }

    /// Whether the next `get()` of `key` will hit the network.
    #[must_use]
    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.entries()
            .get(key)
            .is_none_or(|entry| entry.stale || entry.value.is_none())
    }

    /// Follow invalidations as they happen.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheKey> {
        self.invalidated_tx.subscribe()
    }
}

impl CacheInvalidator for ResourceCache {
    fn invalidate(&self, key: &CacheKey) {
        {
            let mut entries = self.entries();
            let entry = entries.entry(key.clone()).or_default();
            entry.stale = true;
            entry.generation += 1;
        }
        // No subscribers is fine.
        let _ = self.invalidated_tx.send(key.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> ResourceCache {
        ResourceCache::new(ApiClient::new("http://127.0.0.1:1").unwrap())
    }

    #[test]
    fn test_unknown_key_is_stale() {
        let cache = cache();
        assert!(cache.is_stale(&CacheKey::Cart));
        assert_eq!(cache.peek(&CacheKey::Cart), None);
    }

    #[test]
    fn test_invalidate_marks_only_that_key() {
        let cache = cache();
        {
            let mut entries = cache.entries();
            for key in [CacheKey::Cart, CacheKey::Orders] {
                entries.insert(
                    key,
                    Entry {
                        value: Some(Value::Null),
                        ..Entry::default()
                    },
                );
            }
        }
        assert!(!cache.is_stale(&CacheKey::Orders));

        let mut events = cache.subscribe();
        cache.invalidate(&CacheKey::Orders);

        assert!(cache.is_stale(&CacheKey::Orders));
        assert!(!cache.is_stale(&CacheKey::Cart));
        assert_eq!(cache.peek(&CacheKey::Orders), Some(Value::Null));
        assert_eq!(events.try_recv().unwrap(), CacheKey::Orders);
    }

    #[tokio::test]
    async fn test_failed_fetch_surfaces_and_stays_stale() {
        let cache = cache();
        assert!(cache.get(&CacheKey::Cart).await.is_err());
        assert!(cache.is_stale(&CacheKey::Cart));
    }
}
