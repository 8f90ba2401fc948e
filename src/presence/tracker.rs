//! Unread chat tracking.
//!
//! Keeps the session's chat messages in arrival order next to the user's
//! "last seen" watermark. The unread count is recomputed from scratch after
//! every mutation and published on a `watch` channel.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::message::ChatMessage;
use super::watermark::WatermarkStore;
use crate::connection::UserId;

/// Messages from the other side newer than `watermark`.
///
/// With no watermark every non-user message is unread.
#[must_use]
pub fn compute_unread(messages: &[ChatMessage], watermark: Option<DateTime<Utc>>) -> usize {
    messages
        .iter()
        .filter(|message| !message.is_from_user)
        .filter(|message| watermark.is_none_or(|seen| message.timestamp > seen))
        .count()
}

/// Chat history plus unread state for the logged-in user.
#[derive(Debug)]
pub struct UnreadTracker {
    store: Arc<dyn WatermarkStore>,
    user: Option<UserId>,
    messages: Vec<ChatMessage>,
    watermark: Option<DateTime<Utc>>,
    unread_tx: watch::Sender<usize>,
}

impl UnreadTracker {
    /// Tracker with no user and no messages.
    pub fn new(store: Arc<dyn WatermarkStore>) -> Self {
        let (unread_tx, _) = watch::channel(0);
        Self {
            store,
            user: None,
            messages: Vec::new(),
            watermark: None,
            unread_tx,
        }
    }

    /// Start tracking for `user`: drops the previous user's messages and
    /// loads `user`'s persisted watermark.
    pub fn switch_user(&mut self, user: UserId) {
        self.messages.clear();
        self.user = Some(user);
        self.watermark = match self.store.load(user) {
            Ok(watermark) => watermark,
            Err(e) => {
                log::warn!("[Unread] Could not load watermark for user {}: {:#}", user, e);
                None
            }
        };
        log::debug!(
            "[Unread] Tracking user {} (last seen {:?})",
            user,
            self.watermark.map(|ts| ts.to_rfc3339())
        );
        self.recompute();
    }

    /// Forget the current user and their messages.
    pub fn clear(&mut self) {
        self.user = None;
        self.messages.clear();
        self.watermark = None;
        self.recompute();
    }

    /// Append `message` in arrival order.
    pub fn record_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.recompute();
    }

    /// Replace the sequence with a fetched history.
    ///
    /// Live messages newer than the last history entry were received while
    /// the fetch was in flight and are kept after it.
    pub fn rehydrate(&mut self, history: Vec<ChatMessage>) {
        let newest = history.iter().map(|message| message.timestamp).max();
        let live = std::mem::replace(&mut self.messages, history);
        let kept = live
            .into_iter()
            .filter(|message| newest.is_none_or(|newest| message.timestamp > newest));
        self.messages.extend(kept);

        log::debug!("[Unread] Rehydrated to {} messages", self.messages.len());
        self.recompute();
    }

    /// Mark everything up to now as seen.
    pub fn mark_seen(&mut self) -> anyhow::Result<()> {
        self.mark_seen_at(Utc::now())
    }

    /// Move the watermark to `at`; it never moves backward.
    ///
    /// The in-memory watermark and count update even when persisting fails;
    /// the error is returned so the caller can report it.
    pub fn mark_seen_at(&mut self, at: DateTime<Utc>) -> anyhow::Result<()> {
        let watermark = self.watermark.map_or(at, |current| current.max(at));
        self.watermark = Some(watermark);
        self.recompute();

        match self.user {
            Some(user) => self.store.save(user, watermark),
            None => {
                log::debug!("[Unread] No user, watermark not persisted");
                Ok(())
            }
        }
    }

    /// Current unread count.
    #[must_use]
    pub fn unread(&self) -> usize {
        *self.unread_tx.borrow()
    }

    /// Observe unread count changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.unread_tx.subscribe()
    }

    /// Messages in arrival order.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Current watermark.
    #[must_use]
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    /// User being tracked.
    #[must_use]
    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    fn recompute(&mut self) {
        let unread = compute_unread(&self.messages, self.watermark);
        self.unread_tx.send_if_modified(|current| {
            if *current == unread {
                return false;
            }
            log::debug!("[Unread] {} -> {}", current, unread);
            *current = unread;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::MemoryWatermarkStore;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    fn message(is_from_user: bool, millis: i64) -> ChatMessage {
        ChatMessage {
            id: millis.to_string(),
            content: String::new(),
            is_from_user,
            timestamp: at(millis),
        }
    }

    fn tracker() -> (UnreadTracker, Arc<MemoryWatermarkStore>) {
        let store = Arc::new(MemoryWatermarkStore::new());
        (UnreadTracker::new(store.clone()), store)
    }

    #[test]
    fn test_compute_unread_against_watermark() {
        let messages = [message(false, 10), message(true, 20), message(false, 30)];
        assert_eq!(compute_unread(&messages, Some(at(15))), 1);
        assert_eq!(compute_unread(&messages, None), 2);
        assert_eq!(compute_unread(&messages, Some(at(30))), 0);
        assert_eq!(compute_unread(&[], None), 0);
    }

    #[test]
    fn test_mark_seen_twice_stays_zero() {
        let (mut tracker, _store) = tracker();
        tracker.switch_user(UserId(1));
        tracker.record_message(message(false, 1_000));
        assert_eq!(tracker.unread(), 1);

        tracker.mark_seen().unwrap();
        assert_eq!(tracker.unread(), 0);
        let first = tracker.watermark();

        tracker.mark_seen().unwrap();
        assert_eq!(tracker.unread(), 0);
        assert!(tracker.watermark() >= first);
    }

    #[test]
    fn test_watermark_never_moves_backward() {
        let (mut tracker, store) = tracker();
        tracker.switch_user(UserId(7));

        tracker.mark_seen_at(at(500)).unwrap();
        tracker.mark_seen_at(at(100)).unwrap();

        assert_eq!(tracker.watermark(), Some(at(500)));
        assert_eq!(store.load(UserId(7)).unwrap(), Some(at(500)));
    }

    #[test]
    fn test_switch_user_loads_their_watermark() {
        let (mut tracker, store) = tracker();
        store.save(UserId(2), at(50)).unwrap();

        tracker.switch_user(UserId(1));
        tracker.record_message(message(false, 40));
        assert_eq!(tracker.unread(), 1);

        tracker.switch_user(UserId(2));
        assert!(tracker.messages().is_empty());
        assert_eq!(tracker.watermark(), Some(at(50)));
        tracker.record_message(message(false, 40));
        tracker.record_message(message(false, 60));
        assert_eq!(tracker.unread(), 1);
    }

    #[test]
    fn test_rehydrate_replaces_sequence() {
        let (mut tracker, _store) = tracker();
        tracker.record_message(message(false, 1));
        tracker.rehydrate(vec![message(true, 5), message(false, 6), message(false, 7)]);
        assert_eq!(tracker.messages().len(), 3);
        assert_eq!(tracker.unread(), 2);
    }

    #[test]
    fn test_rehydrate_keeps_newer_live_messages() {
        let (mut tracker, _store) = tracker();
        tracker.record_message(message(false, 3));
        tracker.record_message(message(false, 9));
        tracker.rehydrate(vec![message(false, 3), message(true, 5)]);

        let stamps: Vec<i64> = tracker
            .messages()
            .iter()
            .map(|m| m.timestamp.timestamp_millis())
            .collect();
        assert_eq!(stamps, vec![3, 5, 9]);
        assert_eq!(tracker.unread(), 2);
    }

    #[test]
    fn test_subscribers_see_changes() {
        let (mut tracker, _store) = tracker();
        let mut rx = tracker.subscribe();
        assert!(!rx.has_changed().unwrap());

        tracker.record_message(message(true, 1));
        assert!(!rx.has_changed().unwrap());

        tracker.record_message(message(false, 2));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);
    }
}
