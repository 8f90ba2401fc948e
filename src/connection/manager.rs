//! Connection manager for the realtime channel.
//!
//! Owns the one logical channel of a logged-in user and drives it from a
//! background tokio task.
//!
//! # Protocol
//!
//! - Opens the transport to `<server>/ws` and immediately sends
//!   `{"type":"auth","userId":N}`
//! - Stays `Connecting` until the server answers `{"type":"auth_ack"}`, then
//!   becomes `Open` and refills the reconnect budget
//! - Forwards every inbound text frame (including `auth_ack`) to the inbound
//!   queue in arrival order
//! - On failed opens and unexpected closes, waits `min(1s * 2^(k-1), 30s)`
//!   and retries, at most 5 times, then parks in `Idle`
//! - `disconnect()` cancels the task, including a pending reconnect timer
//!
//! # Usage
//!
//! ```ignore
//! let mut manager = ConnectionManager::builder()
//!     .transport(Arc::new(WebSocketTransport))
//!     .url("wss://food.example.com/ws")
//!     .build()?;
//! let mut inbound = manager.take_inbound().context("inbound already taken")?;
//! manager.connect(UserId(42));
//! while let Some(frame) = inbound.recv().await {
//!     router.dispatch(&frame);
//! }
//! ```

// Rust guideline compliant 2026-02

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::backoff::{ReconnectBudget, ReconnectPolicy};
use super::transport::Transport;
use super::{ConnectionState, UserId};
use crate::config::Config;
use crate::constants;
use crate::events::{is_auth_ack, ClientMessage};
use crate::ws::WsMessage;

/// Owner of the realtime channel.
///
/// Must be used from within a tokio runtime; `connect()` spawns the
/// connection task.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    url: String,
    policy: ReconnectPolicy,
    auth_timeout: Duration,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    inbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: Option<mpsc::UnboundedReceiver<String>>,
    active: Option<ActiveConnection>,
}

/// The running connection task for one identity.
struct ActiveConnection {
    identity: UserId,
    cancel: CancellationToken,
    outbound_tx: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.url)
            .field("policy", &self.policy)
            .field("state", &*self.state_tx.borrow())
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConnectionManager`].
#[derive(Debug)]
pub struct ConnectionManagerBuilder {
    transport: Option<Arc<dyn Transport>>,
    url: Option<String>,
    policy: ReconnectPolicy,
    auth_timeout: Duration,
}

impl Default for ConnectionManagerBuilder {
    fn default() -> Self {
        Self {
            transport: None,
            url: None,
            policy: ReconnectPolicy::default(),
            auth_timeout: constants::AUTH_ACK_TIMEOUT,
        }
    }
}

impl ConnectionManagerBuilder {
    /// Set the transport (required).
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the full endpoint URL, e.g. `wss://host/ws` (required).
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Override the reconnect schedule.
    #[must_use]
    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the `auth_ack` deadline.
    #[must_use]
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Build the manager in `Idle` state.
    pub fn build(self) -> Result<ConnectionManager> {
        let transport = self
            .transport
            .ok_or_else(|| anyhow!("ConnectionManager requires a transport"))?;
        let url = self
            .url
            .ok_or_else(|| anyhow!("ConnectionManager requires an endpoint url"))?;

        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Ok(ConnectionManager {
            transport,
            url,
            policy: self.policy,
            auth_timeout: self.auth_timeout,
            state_tx: Arc::new(state_tx),
            inbound_tx,
            inbound_rx: Some(inbound_rx),
            active: None,
        })
    }
}

impl ConnectionManager {
    /// Create a manager builder.
    #[must_use]
    pub fn builder() -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::default()
    }

    /// Manager for the endpoint, schedule and timeout in `config`.
    #[must_use]
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Self {
            transport,
            url: config.ws_url(),
            policy: config.reconnect_policy(),
            auth_timeout: config.auth_timeout(),
            state_tx: Arc::new(state_tx),
            inbound_tx,
            inbound_rx: Some(inbound_rx),
            active: None,
        }
    }

    /// Take the inbound frame queue.
    ///
    /// The queue outlives reconnects: one receiver sees every frame of every
    /// connection in arrival order. Returns `None` once taken.
    pub fn take_inbound(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.inbound_rx.take()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Identity of the running connection task, if any.
    #[must_use]
    pub fn identity(&self) -> Option<UserId> {
        self.active.as_ref().map(|active| active.identity)
    }

    /// The endpoint this manager connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start (or restart) the channel for `identity`.
    ///
    /// A no-op while the channel for the same identity is `Connecting` or
    /// `Open`. A different identity, or a channel that gave up (`Idle`), gets
    /// a fresh connection with a full reconnect budget. Failures never
    /// surface here; they feed the reconnect loop.
    pub fn connect(&mut self, identity: UserId) {
        let live = matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Open
        );
        if let Some(active) = &self.active {
            if active.identity == identity && live && !active.task.is_finished() {
                log::debug!("[Connection] Already connected as user {}", identity);
                return;
            }
        }

        self.teardown();

        let cancel = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let ctx = LoopContext {
            identity,
            transport: Arc::clone(&self.transport),
            url: self.url.clone(),
            policy: self.policy,
            auth_timeout: self.auth_timeout,
            state_tx: Arc::clone(&self.state_tx),
            inbound_tx: self.inbound_tx.clone(),
            cancel: cancel.clone(),
        };

        ctx.set_state(ConnectionState::Connecting);
        log::info!("[Connection] Connecting to {} as user {}", self.url, identity);

        let task = tokio::spawn(run_connection_loop(ctx, outbound_rx));
        self.active = Some(ActiveConnection {
            identity,
            cancel,
            outbound_tx,
            task,
        });
    }

    /// Close the channel. Safe in any state, and idempotent.
    ///
    /// Cancels the connection task, including a pending reconnect timer.
    pub fn disconnect(&mut self) {
        if let Some(identity) = self.identity() {
            log::info!("[Connection] Disconnecting user {}", identity);
        }
        self.teardown();
        self.state_tx.send_replace(ConnectionState::Closed);
    }

    /// Like [`disconnect`](Self::disconnect), but also waits for the
    /// connection task to exit.
    ///
    /// Once this returns no further frame reaches the inbound queue.
    pub async fn shutdown(&mut self) {
        if let Some(identity) = self.identity() {
            log::info!("[Connection] Shutting down channel for user {}", identity);
        }
        let task = self.teardown();
        self.state_tx.send_replace(ConnectionState::Closed);

        if let Some(task) = task {
            if let Err(e) = task.await {
                log::error!("[Connection] Connection task failed: {}", e);
            }
        }
    }

    /// Send `message` if the channel is open.
    ///
    /// Returns `false` (after logging) when the channel is not open; the
    /// message is dropped, never queued.
    pub fn send(&self, message: &ClientMessage) -> bool {
        let state = self.state();
        let Some(active) = self
            .active
            .as_ref()
            .filter(|_| state == ConnectionState::Open)
        else {
            log::warn!(
                "[Connection] Dropping {} message: channel is {}",
                message.kind(),
                state
            );
            return false;
        };

        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("[Connection] Failed to encode {}: {}", message.kind(), e);
                return false;
            }
        };

        if active.outbound_tx.send(frame).is_err() {
            log::warn!(
                "[Connection] Dropping {} message: connection task gone",
                message.kind()
            );
            return false;
        }
        true
    }

    fn teardown(&mut self) -> Option<JoinHandle<()>> {
        let active = self.active.take()?;
        active.cancel.cancel();
        Some(active.task)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Everything the background task needs, detached from the manager.
struct LoopContext {
    identity: UserId,
    transport: Arc<dyn Transport>,
    url: String,
    policy: ReconnectPolicy,
    auth_timeout: Duration,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    inbound_tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl LoopContext {
    /// Publish `state` unless this task has been cancelled.
    ///
    /// The cancellation check runs under the watch lock, so a cancelled task
    /// can never overwrite the `Closed` written by `disconnect()`.
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if self.cancel.is_cancelled() || *current == state {
                return false;
            }
            log::debug!("[Connection] {} -> {}", current, state);
            *current = state;
            true
        });
    }
}

/// Why one connection attempt ended.
#[derive(Debug)]
enum SessionExit {
    /// Cancelled by `disconnect()` or a new `connect()`.
    Cancelled,
    /// Never reached `Open`.
    OpenFailed(String),
    /// Was `Open`, then lost.
    Dropped(String),
}

fn lost(authenticated: bool, reason: String) -> SessionExit {
    if authenticated {
        SessionExit::Dropped(reason)
    } else {
        SessionExit::OpenFailed(reason)
    }
}

/// Reconnect loop: one session per iteration, backoff in between.
async fn run_connection_loop(ctx: LoopContext, mut outbound_rx: mpsc::UnboundedReceiver<String>) {
    let mut budget = ReconnectBudget::new(ctx.policy);

    loop {
        match run_session(&ctx, &mut outbound_rx, &mut budget).await {
            SessionExit::Cancelled => {
                log::debug!("[Connection] Task for user {} cancelled", ctx.identity);
                return;
            }
            SessionExit::OpenFailed(reason) => {
                log::warn!("[Connection] Failed to open channel: {}", reason);
            }
            SessionExit::Dropped(reason) => {
                log::warn!("[Connection] Channel lost: {}", reason);
            }
        }

        let Some(delay) = budget.next_delay() else {
            log::warn!(
                "[Connection] Giving up after {} reconnect attempts (waiting for next connect)",
                ctx.policy.max_attempts
            );
            ctx.set_state(ConnectionState::Idle);
            return;
        };

        ctx.set_state(ConnectionState::Connecting);
        log::info!(
            "[Connection] Reconnecting in {:.1}s (attempt {}/{})",
            delay.as_secs_f32(),
            budget.attempts(),
            ctx.policy.max_attempts
        );

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = ctx.cancel.cancelled() => {
                log::debug!("[Connection] Reconnect timer cancelled");
                return;
            }
        }
    }
}

/// Open, authenticate and pump one connection until it ends.
async fn run_session(
    ctx: &LoopContext,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    budget: &mut ReconnectBudget,
) -> SessionExit {
    ctx.set_state(ConnectionState::Connecting);

    let opened = tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => return SessionExit::Cancelled,
        result = ctx.transport.open(&ctx.url) => result,
    };
    let (mut sink, mut source) = match opened {
        Ok(pair) => pair,
        Err(e) => return SessionExit::OpenFailed(format!("{e:#}")),
    };

    let auth = ClientMessage::Auth {
        user_id: ctx.identity,
    };
    let frame = match auth.to_frame() {
        Ok(frame) => frame,
        Err(e) => return SessionExit::OpenFailed(format!("auth encode failed: {e}")),
    };
    if let Err(e) = sink.send_text(&frame).await {
        return SessionExit::OpenFailed(format!("auth send failed: {e:#}"));
    }
    log::debug!("[Connection] Sent auth for user {}", ctx.identity);

    let auth_deadline = tokio::time::sleep(ctx.auth_timeout);
    tokio::pin!(auth_deadline);
    let mut authenticated = false;

    let exit = loop {
        tokio::select! {
            // Cancellation wins over frames already waiting on the wire.
            biased;

            () = ctx.cancel.cancelled() => break SessionExit::Cancelled,

            () = &mut auth_deadline, if !authenticated => {
                break SessionExit::OpenFailed(format!(
                    "no auth_ack within {}s",
                    ctx.auth_timeout.as_secs()
                ));
            }

            frame = source.recv() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if !authenticated && is_auth_ack(&text) {
                        authenticated = true;
                        budget.reset();

                        // Anything queued before the channel opened is dropped, not replayed
                        let mut stale = 0usize;
                        while outbound_rx.try_recv().is_ok() {
                            stale += 1;
                        }
                        if stale > 0 {
                            log::debug!("[Connection] Discarded {} frames queued while closed", stale);
                        }

                        ctx.set_state(ConnectionState::Open);
                        log::info!("[Connection] Channel open for user {}", ctx.identity);
                    }
                    if ctx.inbound_tx.send(text).is_err() {
                        log::debug!("[Connection] No inbound consumer, frame dropped");
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Err(e) = sink.send_pong(data).await {
                        break lost(authenticated, format!("pong failed: {e:#}"));
                    }
                }
                Some(Ok(WsMessage::Close { code, reason })) => {
                    break lost(authenticated, format!("closed by server ({code} {reason})"));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break lost(authenticated, format!("{e:#}")),
                None => break lost(authenticated, "stream ended".to_string()),
            },

            Some(frame) = outbound_rx.recv(), if authenticated => {
                if let Err(e) = sink.send_text(&frame).await {
                    break lost(authenticated, format!("send failed: {e:#}"));
                }
            }
        }
    };

    if matches!(exit, SessionExit::Cancelled) {
        let _ = sink.close().await;
    }
    exit
}
