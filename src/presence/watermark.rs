//! Durable storage for per-user "last seen" watermarks.
//!
//! The file store keeps one JSON object in `<state_dir>/watermarks.json`:
//!
//! ```json
//! { "chat_last_seen_42": "2026-03-01T10:00:00Z" }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::connection::UserId;
use crate::constants;

/// Storage key for `user`'s watermark.
#[must_use]
pub fn watermark_key(user: UserId) -> String {
    format!("{}{}", constants::WATERMARK_KEY_PREFIX, user)
}

/// Where watermarks persist between runs.
pub trait WatermarkStore: Send + Sync + std::fmt::Debug {
    /// The stored watermark for `user`, if any.
    fn load(&self, user: UserId) -> Result<Option<DateTime<Utc>>>;

    /// Persist `at` as `user`'s watermark.
    fn save(&self, user: UserId, at: DateTime<Utc>) -> Result<()>;
}

/// JSON-file watermark store.
#[derive(Debug)]
pub struct FileWatermarkStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileWatermarkStore {
    /// Store backed by `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at the standard file name inside `state_dir`.
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(constants::WATERMARK_FILE))
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let contents = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl WatermarkStore for FileWatermarkStore {
    fn load(&self, user: UserId) -> Result<Option<DateTime<Utc>>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = self.read_all()?;

        let Some(raw) = entries.get(&watermark_key(user)) else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Ok(Some(ts.with_timezone(&Utc))),
            Err(e) => {
                log::warn!("[Unread] Ignoring corrupt watermark for user {}: {}", user, e);
                Ok(None)
            }
        }
    }

    fn save(&self, user: UserId, at: DateTime<Utc>) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        // A corrupt file is replaced rather than blocking every future save.
        let mut entries = self.read_all().unwrap_or_else(|e| {
            log::warn!("[Unread] Rewriting unreadable watermark file: {:#}", e);
            BTreeMap::new()
        });
        entries.insert(watermark_key(user), at.to_rfc3339());
        self.write_all(&entries)
    }
}

/// In-memory watermark store, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    entries: Mutex<HashMap<UserId, DateTime<Utc>>>,
}

impl MemoryWatermarkStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    fn load(&self, user: UserId) -> Result<Option<DateTime<Utc>>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&user).copied())
    }

    fn save(&self, user: UserId, at: DateTime<Utc>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(user, at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_is_scoped_by_user() {
        assert_eq!(watermark_key(UserId(42)), "chat_last_seen_42");
    }

    #[test]
    fn test_file_store_round_trip_per_user() {
        let dir = TempDir::new().unwrap();
        let store = FileWatermarkStore::in_dir(&dir.path().join("state"));
        let at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();

        assert_eq!(store.load(UserId(1)).unwrap(), None);
        store.save(UserId(1), at).unwrap();

        assert_eq!(store.load(UserId(1)).unwrap(), Some(at));
        assert_eq!(store.load(UserId(2)).unwrap(), None);

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("chat_last_seen_1"));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let at = DateTime::from_timestamp_millis(5_000).unwrap();
        FileWatermarkStore::in_dir(dir.path()).save(UserId(9), at).unwrap();

        let reopened = FileWatermarkStore::in_dir(dir.path());
        assert_eq!(reopened.load(UserId(9)).unwrap(), Some(at));
    }

    #[test]
    fn test_corrupt_file_is_replaced_on_save() {
        let dir = TempDir::new().unwrap();
        let store = FileWatermarkStore::in_dir(dir.path());
        fs::write(store.path(), "{not json").unwrap();

        assert!(store.load(UserId(1)).is_err());
        let at = DateTime::from_timestamp_millis(1_000).unwrap();
        store.save(UserId(1), at).unwrap();
        assert_eq!(store.load(UserId(1)).unwrap(), Some(at));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryWatermarkStore::new();
        let at = Utc::now();
        store.save(UserId(3), at).unwrap();
        assert_eq!(store.load(UserId(3)).unwrap(), Some(at));
        assert_eq!(store.load(UserId(4)).unwrap(), None);
    }
}
