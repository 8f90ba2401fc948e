//! Integration tests for the REST client and the read-through cache,
//! against a wiremock backend.

use orderwire::cache::{CacheInvalidator, CacheKey, ResourceCache};
use orderwire::connection::UserId;
use orderwire::presence::{FileWatermarkStore, WatermarkStore};
use orderwire::{commands, ApiClient, Config};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn requests_to(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == route)
        .count()
}

#[tokio::test]
async fn test_get_serves_cached_until_invalidated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 12, "status": "preparing"})))
        .mount(&server)
        .await;

    let cache = ResourceCache::new(ApiClient::new(server.uri()).unwrap());
    let key = CacheKey::Order("12".into());

    let first = cache.get(&key).await.unwrap();
    assert_eq!(first["status"], "preparing");
    assert!(!cache.is_stale(&key));

    cache.get(&key).await.unwrap();
    assert_eq!(requests_to(&server, "/api/orders/12").await, 1);

    cache.invalidate(&key);
    assert!(cache.is_stale(&key));
    assert_eq!(cache.peek(&key), Some(first));

    cache.get(&key).await.unwrap();
    assert_eq!(requests_to(&server, "/api/orders/12").await, 2);
    assert!(!cache.is_stale(&key));
}

#[tokio::test]
async fn test_invalidation_touches_only_its_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let cache = ResourceCache::new(ApiClient::new(server.uri()).unwrap());
    cache.get(&CacheKey::Cart).await.unwrap();
    cache.get(&CacheKey::Orders).await.unwrap();

    cache.invalidate(&CacheKey::Cart);
    assert!(cache.is_stale(&CacheKey::Cart));
    assert!(!cache.is_stale(&CacheKey::Orders));
}

#[tokio::test]
async fn test_http_error_is_returned_and_entry_stays_stale() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/notifications/count"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let cache = ResourceCache::new(ApiClient::new(server.uri()).unwrap());
    let err = cache.get(&CacheKey::NotificationCount).await.unwrap_err();
    assert!(format!("{err:#}").contains("503"));
    assert!(cache.is_stale(&CacheKey::NotificationCount));
}

#[tokio::test]
async fn test_chat_history_and_offline_unread_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chat/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "content": "Hi, where is my order?", "isFromUser": true, "timestamp": 10},
            {"id": 2, "content": "Checking now", "isFromUser": false, "timestamp": 20},
            {"id": 3, "content": "It left the kitchen", "isFromUser": false, "timestamp": 30}
        ])))
        .mount(&server)
        .await;

    let history = ApiClient::new(server.uri()).unwrap().chat_history().await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].id, "1");

    let dir = TempDir::new().unwrap();
    let config = Config {
        server_url: server.uri(),
        state_dir: dir.path().to_path_buf(),
        ..Config::default()
    };

    assert_eq!(commands::unread_count(&config, UserId(42)).await.unwrap(), 2);

    let store = FileWatermarkStore::in_dir(dir.path());
    store
        .save(UserId(42), chrono::DateTime::from_timestamp_millis(25).unwrap())
        .unwrap();
    assert_eq!(commands::unread_count(&config, UserId(42)).await.unwrap(), 1);

    commands::mark_seen(&config, UserId(42)).unwrap();
    assert_eq!(commands::unread_count(&config, UserId(42)).await.unwrap(), 0);
}
