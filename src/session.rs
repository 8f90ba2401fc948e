//! Realtime session: the explicit context that replaces a global socket.
//!
//! A [`Session`] owns one [`ConnectionManager`] plus the router, the cache
//! bridge and the unread tracker, and wires them together:
//!
//! ```text
//! inbound frames ──► dispatch task ──► EventRouter
//!                                        ├── chat_message     → UnreadTracker
//!                                        ├── realtime_update  → CacheInvalidationBridge
//!                                        ├── notification     → CacheInvalidationBridge (+ alert)
//!                                        └── extra handlers registered with `on()`
//! ```
//!
//! Frames are dispatched one at a time, in arrival order, on a single task.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::cache::{Alert, CacheInvalidationBridge, CacheInvalidator};
use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionState, Transport, UserId};
use crate::events::{ClientMessage, Envelope, EventRouter, Route};
use crate::presence::{ChatMessage, UnreadTracker, WatermarkStore};

type Inbound = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>;

struct DispatchTask {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// One logged-in client's realtime context.
pub struct Session {
    manager: ConnectionManager,
    router: Arc<Mutex<EventRouter>>,
    tracker: Arc<Mutex<UnreadTracker>>,
    inbound: Inbound,
    alerts: Option<mpsc::UnboundedReceiver<Alert>>,
    dispatch: Option<DispatchTask>,
    user: Option<UserId>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("state", &self.manager.state())
            .field("dispatching", &self.dispatch.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build a session and register the built-in handlers.
    ///
    /// Nothing connects until [`Session::start`].
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn CacheInvalidator>,
        store: Arc<dyn WatermarkStore>,
    ) -> Self {
        let mut manager = ConnectionManager::from_config(config, transport);
        let inbound_rx = manager
            .take_inbound()
            .unwrap_or_else(|| mpsc::unbounded_channel().1);

        let tracker = Arc::new(Mutex::new(UnreadTracker::new(store)));
        let (bridge, alerts) = CacheInvalidationBridge::new(cache);
        let bridge = Arc::new(bridge);

        let mut router = EventRouter::new();
        {
            let tracker = Arc::clone(&tracker);
            router.on(Route::ChatMessage, move |envelope: &Envelope| {
                match ChatMessage::from_envelope(envelope) {
                    Ok(message) => lock(&tracker).record_message(message),
                    Err(e) => log::warn!("[Router] Dropping chat message: {}", e),
                }
            });
        }
        for route in [Route::AnyUpdate, Route::Notification] {
            let bridge = Arc::clone(&bridge);
            router.on(route, move |envelope: &Envelope| {
                bridge.handle(envelope);
            });
        }

        Self {
            manager,
            router: Arc::new(Mutex::new(router)),
            tracker,
            inbound: Arc::new(tokio::sync::Mutex::new(inbound_rx)),
            alerts: Some(alerts),
            dispatch: None,
            user: None,
        }
    }

    /// Log `user` in: load their watermark, start dispatching and connect.
    ///
    /// Calling it again for the same user is harmless. Switching to another
    /// user first tears the previous user's channel down, the same way
    /// [`Session::logout`] does, so none of their frames reach the new user.
    pub async fn start(&mut self, user: UserId) {
        if self.user != Some(user) {
            if let Some(previous) = self.user {
                log::info!("[Connection] Switching from user {} to user {}", previous, user);
                self.stop().await;
            }
            lock(&self.tracker).switch_user(user);
            self.user = Some(user);
        }

        let running = self
            .dispatch
            .as_ref()
            .is_some_and(|dispatch| !dispatch.task.is_finished());
        if !running {
            let cancel = CancellationToken::new();
            let task = tokio::spawn(run_dispatch(
                Arc::clone(&self.inbound),
                Arc::clone(&self.router),
                cancel.clone(),
            ));
            self.dispatch = Some(DispatchTask { cancel, task });
        }

        self.manager.connect(user);
    }

    /// Log out: close the channel, stop dispatching and forget the user.
    ///
    /// Frames still queued from the closed channel are discarded.
    pub async fn logout(&mut self) {
        self.stop().await;
        lock(&self.tracker).clear();
        if let Some(user) = self.user.take() {
            log::info!("[Connection] User {} logged out", user);
        }
    }

    /// Close the channel, wait for dispatch to stop and drop queued frames.
    async fn stop(&mut self) {
        self.manager.shutdown().await;

        if let Some(dispatch) = self.dispatch.take() {
            dispatch.cancel.cancel();
            if let Err(e) = dispatch.task.await {
                log::error!("[Router] Dispatch task failed: {}", e);
            }
        }

        let mut inbound = self.inbound.lock().await;
        let mut discarded = 0usize;
        while inbound.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            log::debug!("[Router] Discarded {} frames from the closed channel", discarded);
        }
    }

    /// Send a chat message and, if it went out, record it locally.
    pub fn send_chat(&self, content: &str) -> bool {
        let sent = self.manager.send(&ClientMessage::ChatMessage {
            content: content.to_string(),
        });
        if sent {
            lock(&self.tracker).record_message(ChatMessage::outgoing(content));
        }
        sent
    }

    /// Mark all messages seen and persist the watermark.
    pub fn mark_seen(&self) -> Result<()> {
        lock(&self.tracker).mark_seen()
    }

    /// Fetch the chat history and replace the local sequence with it.
    pub async fn load_history(&self, api: &ApiClient) -> Result<usize> {
        let history = api.chat_history().await?;
        let count = history.len();
        lock(&self.tracker).rehydrate(history);
        Ok(count)
    }

    /// Register an extra handler. It runs after the built-in ones.
    pub fn on(&self, route: Route, handler: impl FnMut(&Envelope) + Send + 'static) {
        lock(&self.router).on(route, handler);
    }

    /// Current unread count.
    pub fn unread(&self) -> usize {
        lock(&self.tracker).unread()
    }

    /// Observe unread count changes.
    pub fn subscribe_unread(&self) -> watch::Receiver<usize> {
        lock(&self.tracker).subscribe()
    }

    /// Snapshot of the chat messages, in arrival order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.tracker).messages().to_vec()
    }

    /// Take the alert receiver. Returns `None` once taken.
    pub fn take_alerts(&mut self) -> Option<mpsc::UnboundedReceiver<Alert>> {
        self.alerts.take()
    }

    /// Current channel state.
    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Observe channel state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe_state()
    }

    /// The logged-in user.
    pub fn user(&self) -> Option<UserId> {
        self.user
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(dispatch) = &self.dispatch {
            dispatch.cancel.cancel();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Feed inbound frames to the router, one at a time, until cancelled.
async fn run_dispatch(inbound: Inbound, router: Arc<Mutex<EventRouter>>, cancel: CancellationToken) {
    let mut inbound = inbound.lock().await;
    log::debug!("[Router] Dispatch started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = inbound.recv() => match frame {
                Some(raw) => {
                    lock(&router).dispatch(&raw);
                }
                None => break,
            },
        }
    }

    log::debug!("[Router] Dispatch stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;
    use crate::connection::MemoryTransport;
    use crate::presence::MemoryWatermarkStore;

    struct NullCache;

    impl CacheInvalidator for NullCache {
        fn invalidate(&self, _key: &CacheKey) {}
    }

    fn session() -> Session {
        let (transport, _accepted) = MemoryTransport::new();
        Session::new(
            &Config::default(),
            Arc::new(transport),
            Arc::new(NullCache),
            Arc::new(MemoryWatermarkStore::new()),
        )
    }

    #[tokio::test]
    async fn test_new_session_is_idle() {
        let mut session = session();
        assert_eq!(session.connection_state(), ConnectionState::Idle);
        assert_eq!(session.user(), None);
        assert_eq!(session.unread(), 0);
        assert!(session.take_alerts().is_some());
        assert!(session.take_alerts().is_none());
    }

    #[tokio::test]
    async fn test_send_chat_while_offline_records_nothing() {
        let session = session();
        assert!(!session.send_chat("hello"));
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_logout_without_start_is_safe() {
        let mut session = session();
        session.logout().await;
        assert_eq!(session.connection_state(), ConnectionState::Closed);
    }
}
