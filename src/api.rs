//! REST client for the ordering backend.
//!
//! Resources are addressed by their logical cache key under `/api/`
//! (`GET /api/orders/17`). Chat history lives at `/api/chat/messages`.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::cache::CacheKey;
use crate::constants;
use crate::presence::ChatMessage;

/// HTTP client bound to one backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    server_url: String,
}

/// History endpoint payload; older backends wrap the list.
#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryResponse {
    Bare(Vec<ChatMessage>),
    Wrapped { messages: Vec<ChatMessage> },
}

impl ApiClient {
    /// Client for `server_url` with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(server_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_client(client, server_url))
    }

    /// Client reusing a pre-configured `reqwest::Client`.
    pub fn with_client(client: Client, server_url: impl Into<String>) -> Self {
        Self {
            client,
            server_url: server_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Base URL requests go to.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Fetch the current representation of `key`.
    pub async fn fetch_resource(&self, key: &CacheKey) -> Result<Value> {
        self.get_json(&key.path()).await
    }

    /// Fetch the chat history, oldest first.
    pub async fn chat_history(&self) -> Result<Vec<ChatMessage>> {
        let history: HistoryResponse = self.get_json("chat/messages").await?;
        Ok(match history {
            HistoryResponse::Bare(messages) | HistoryResponse::Wrapped { messages } => messages,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/api/{}", self.server_url, path);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        if !response.status().is_success() {
            anyhow::bail!("GET {} returned {}", url, response.status());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {url}"))
    }
}
