//! Unread count and mark-seen without opening the realtime channel.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::api::ApiClient;
use crate::config::Config;
use crate::connection::UserId;
use crate::presence::{compute_unread, FileWatermarkStore, WatermarkStore};

/// Unread messages for `user`: fetched history against the stored watermark.
pub async fn count(config: &Config, user: UserId) -> Result<usize> {
    let store = FileWatermarkStore::in_dir(&config.state_dir);
    let watermark = store
        .load(user)
        .with_context(|| format!("Failed to load watermark for user {user}"))?;

    let api = ApiClient::new(config.server_url.clone())?;
    let history = api.chat_history().await?;

    Ok(compute_unread(&history, watermark))
}

/// Move `user`'s watermark to now (never backward). Returns the stored value.
pub fn mark_seen(config: &Config, user: UserId) -> Result<DateTime<Utc>> {
    let store = FileWatermarkStore::in_dir(&config.state_dir);
    let now = Utc::now();
    let watermark = match store.load(user)? {
        Some(previous) if previous > now => previous,
        _ => now,
    };
    store.save(user, watermark)?;
    Ok(watermark)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mark_seen_persists_into_state_dir() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            state_dir: dir.path().to_path_buf(),
            ..Config::default()
        };

        let first = mark_seen(&config, UserId(5)).unwrap();
        let second = mark_seen(&config, UserId(5)).unwrap();
        assert!(second >= first);

        let stored = FileWatermarkStore::in_dir(dir.path()).load(UserId(5)).unwrap();
        assert_eq!(stored, Some(second));
    }
}
