//! `orderwire listen`: run a live session until Ctrl-C.
//!
//! Prints state transitions, chat messages, alerts, unread changes and cache
//! invalidations as they happen. Invalidated resources are refetched in the
//! background so the cache stays warm.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use crate::api::ApiClient;
use crate::cache::{CacheInvalidator, ResourceCache};
use crate::config::Config;
use crate::connection::{ConnectionState, UserId};
use crate::events::Route;
use crate::presence::FileWatermarkStore;
use crate::session::Session;
use crate::ws::WebSocketTransport;

/// Run a session for `user` until Ctrl-C.
pub async fn run(config: &Config, user: UserId) -> Result<()> {
    let api = ApiClient::new(config.server_url.clone())?;
    let cache = Arc::new(ResourceCache::new(api.clone()));
    let store = Arc::new(FileWatermarkStore::in_dir(&config.state_dir));

    let mut session = Session::new(
        config,
        Arc::new(WebSocketTransport),
        Arc::clone(&cache) as Arc<dyn CacheInvalidator>,
        store,
    );
    let mut alerts = session.take_alerts().context("alert receiver already taken")?;

    session.on(Route::ChatMessage, |envelope| {
        let payload = envelope.payload();
        let content = payload.get("content").and_then(Value::as_str).unwrap_or_default();
        let from_user = payload.get("isFromUser").and_then(Value::as_bool).unwrap_or(false);
        println!("[chat] {}: {}", if from_user { "you" } else { "support" }, content);
    });

    let mut state = session.subscribe_state();
    let mut unread = session.subscribe_unread();
    let mut invalidated = cache.subscribe();

    println!("Listening as user {} on {}", user, config.ws_url());
    session.start(user).await;

    match session.load_history(&api).await {
        Ok(count) => log::info!("[Unread] Loaded {} history messages", count),
        Err(e) => log::warn!("[Unread] Chat history unavailable: {:#}", e),
    }
    println!("[unread] {}", session.unread());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    log::error!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
            Ok(()) = state.changed() => {
                let current = *state.borrow_and_update();
                println!("[state] {current}");
                if current == ConnectionState::Idle {
                    println!("Gave up reconnecting; press Ctrl-C to exit");
                }
            }
            Ok(()) = unread.changed() => {
                println!("[unread] {}", *unread.borrow_and_update());
            }
            Some(alert) = alerts.recv() => {
                println!("[alert] {}: {}", alert.title, alert.message);
            }
            key = invalidated.recv() => match key {
                Ok(key) => {
                    println!("[stale] {key}");
                    let cache = Arc::clone(&cache);
                    tokio::spawn(async move {
                        if let Err(e) = cache.get(&key).await {
                            log::warn!("[Cache] {:#}", e);
                        }
                    });
                }
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("[Cache] Missed {} invalidation notices", missed);
                }
                Err(RecvError::Closed) => {}
            },
        }
    }

    println!("Shutting down");
    session.logout().await;
    Ok(())
}
