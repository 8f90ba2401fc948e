//! End-to-end handshake over a real WebSocket.
//!
//! Runs a scripted `tokio-tungstenite` server on a loopback port and drives
//! the production transport against it.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use orderwire::connection::{ConnectionManager, ConnectionState, UserId};
use orderwire::events::ClientMessage;
use orderwire::ws::WebSocketTransport;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

const STEP: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct ServerLog {
    auth: String,
    pong: Vec<u8>,
    chat: String,
}

async fn scripted_server(listener: TcpListener) -> ServerLog {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

    let auth = match ws.next().await {
        Some(Ok(Message::Text(text))) => text,
        other => panic!("expected auth frame, got {other:?}"),
    };
    ws.send(Message::Text(r#"{"type":"auth_ack"}"#.into())).await.unwrap();

    ws.send(Message::Ping(b"heartbeat".to_vec())).await.unwrap();
    let pong = loop {
        match ws.next().await {
            Some(Ok(Message::Pong(data))) => break data,
            Some(Ok(_)) => {}
            other => panic!("expected pong, got {other:?}"),
        }
    };

    ws.send(Message::Text(
        r#"{"type":"chat_message","content":"Your rider is outside","isFromUser":false,"timestamp":1700000000000}"#
            .into(),
    ))
    .await
    .unwrap();

    let chat = loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => break text,
            Some(Ok(_)) => {}
            other => panic!("expected chat frame, got {other:?}"),
        }
    };

    ws.close(None).await.unwrap();
    ServerLog { auth, pong, chat }
}

#[tokio::test]
async fn test_handshake_ping_and_chat_over_loopback() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(scripted_server(listener));

    let mut manager = ConnectionManager::builder()
        .transport(Arc::new(WebSocketTransport))
        .url(format!("ws://127.0.0.1:{port}/ws"))
        .build()
        .unwrap();
    let mut inbound = manager.take_inbound().unwrap();
    let mut state = manager.subscribe_state();

    manager.connect(UserId(42));

    tokio::time::timeout(STEP, state.wait_for(|s| *s == ConnectionState::Open))
        .await
        .unwrap()
        .unwrap();

    let ack = tokio::time::timeout(STEP, inbound.recv()).await.unwrap().unwrap();
    assert_eq!(ack, r#"{"type":"auth_ack"}"#);
    let chat = tokio::time::timeout(STEP, inbound.recv()).await.unwrap().unwrap();
    assert!(chat.contains("Your rider is outside"));

    assert!(manager.send(&ClientMessage::ChatMessage {
        content: "thanks!".into(),
    }));

    let log = tokio::time::timeout(STEP, server).await.unwrap().unwrap();
    assert_eq!(log.auth, r#"{"type":"auth","userId":42}"#);
    assert_eq!(log.pong, b"heartbeat");
    assert_eq!(log.chat, r#"{"type":"chat_message","content":"thanks!"}"#);

    // Server closed on us: the manager falls back to reconnecting.
    tokio::time::timeout(STEP, state.wait_for(|s| *s == ConnectionState::Connecting))
        .await
        .unwrap()
        .unwrap();

    manager.disconnect();
    assert_eq!(manager.state(), ConnectionState::Closed);
}
