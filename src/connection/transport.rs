//! Transport seam for the connection manager.
//!
//! A [`Transport`] opens one bidirectional text channel and hands back its
//! two halves. The production implementation is [`crate::ws::WebSocketTransport`];
//! [`super::MemoryTransport`] backs the tests.

use anyhow::Result;
use async_trait::async_trait;

use crate::ws::WsMessage;

/// Opens connections to the realtime endpoint.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Open a connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is unreachable or the handshake fails.
    async fn open(&self, url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)>;
}

/// Write half of an open connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send a UTF-8 text frame.
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Answer a ping.
    async fn send_pong(&mut self, data: Vec<u8>) -> Result<()>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of an open connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the stream has ended.
    async fn recv(&mut self) -> Option<Result<WsMessage>>;
}
