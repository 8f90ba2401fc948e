//! In-process transport.
//!
//! [`MemoryTransport`] stands in for the WebSocket in tests and offline
//! demos. Every successful `open()` yields a [`ServerEnd`] on the accept
//! channel; the test plays the backend through it. Opens can be refused to
//! exercise the reconnect path.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::transport::{FrameSink, FrameSource, Transport};
use crate::ws::WsMessage;

#[derive(Debug, Default)]
struct Inner {
    /// Refuse this many upcoming opens.
    refuse_next: usize,
    /// Refuse every open while set.
    refuse_all: bool,
    /// Instant of every open attempt, refused or not.
    attempts: Vec<Instant>,
    /// URL of every open attempt.
    urls: Vec<String>,
}

/// Transport backed by in-memory channels.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Inner>>,
    accepted_tx: mpsc::UnboundedSender<ServerEnd>,
}

impl MemoryTransport {
    /// Create a transport and the receiver of accepted connections.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let transport = Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            accepted_tx,
        };
        (transport, accepted_rx)
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse the next `count` opens.
    pub fn refuse_next(&self, count: usize) {
        self.inner().refuse_next = count;
    }

    /// Refuse all opens until called again with `false`.
    pub fn refuse_all(&self, refuse: bool) {
        self.inner().refuse_all = refuse;
    }

    /// Number of open attempts so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.inner().attempts.len()
    }

    /// Instants of every open attempt, in order.
    #[must_use]
    pub fn open_instants(&self) -> Vec<Instant> {
        self.inner().attempts.clone()
    }

    /// URLs of every open attempt, in order.
    #[must_use]
    pub fn opened_urls(&self) -> Vec<String> {
        self.inner().urls.clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        {
            let mut inner = self.inner();
            inner.attempts.push(Instant::now());
            inner.urls.push(url.to_string());
            if inner.refuse_all {
                return Err(anyhow!("connection refused: {url}"));
            }
            if inner.refuse_next > 0 {
                inner.refuse_next -= 1;
                return Err(anyhow!("connection refused: {url}"));
            }
        }

        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        self.accepted_tx
            .send(ServerEnd {
                from_client: client_rx,
                to_client: server_tx,
            })
            .map_err(|e| anyhow!("no listener for memory transport: {e}"))?;

        Ok((
            Box::new(MemorySink { tx: Some(client_tx) }),
            Box::new(MemorySource { rx: server_rx }),
        ))
    }
}

/// Backend side of one accepted memory connection.
///
/// Dropping it ends the client's stream, which the manager treats as an
/// unexpected close.
#[derive(Debug)]
pub struct ServerEnd {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<WsMessage>,
}

impl ServerEnd {
    /// Next text frame sent by the client, `None` once it closed.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next client frame if one is already buffered.
    pub fn try_recv_text(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Push a text frame to the client.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(WsMessage::Text(text.into()));
    }

    /// Push an arbitrary frame to the client.
    pub fn push(&self, message: WsMessage) {
        let _ = self.to_client.send(message);
    }

    /// Send a normal close frame to the client.
    pub fn close(&self) {
        self.push(WsMessage::Close {
            code: 1000,
            reason: String::new(),
        });
    }
}

#[derive(Debug)]
struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        let tx = self.tx.as_ref().ok_or_else(|| anyhow!("sink closed"))?;
        tx.send(text.to_string())
            .map_err(|e| anyhow!("peer went away: {e}"))
    }

    async fn send_pong(&mut self, _data: Vec<u8>) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }
}

#[derive(Debug)]
struct MemorySource {
    rx: mpsc::UnboundedReceiver<WsMessage>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn recv(&mut self) -> Option<Result<WsMessage>> {
        self.rx.recv().await.map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_pairs_client_and_server() {
        let (transport, mut accepted) = MemoryTransport::new();
        let (mut sink, mut source) = transport.open("ws://memory/ws").await.unwrap();
        let mut server = accepted.recv().await.unwrap();

        sink.send_text("hello").await.unwrap();
        assert_eq!(server.recv_text().await.as_deref(), Some("hello"));

        server.push_text("world");
        let frame = source.recv().await.unwrap().unwrap();
        assert_eq!(frame, WsMessage::Text("world".to_string()));

        drop(server);
        assert!(source.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_refuse_next_counts_down() {
        let (transport, _accepted) = MemoryTransport::new();
        transport.refuse_next(1);
        assert!(transport.open("ws://memory/ws").await.is_err());
        assert!(transport.open("ws://memory/ws").await.is_ok());
        assert_eq!(transport.open_count(), 2);
        assert_eq!(transport.opened_urls(), vec!["ws://memory/ws"; 2]);
    }
}
