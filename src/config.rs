//! Configuration loading and persistence.
//!
//! Reads `config.json` from the config directory, then applies
//! `ORDERWIRE_*` environment overrides. Missing or unreadable files fall back
//! to defaults so a fresh install connects to the default backend.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;
use std::{fs, path::PathBuf};

use crate::connection::ReconnectPolicy;
use crate::constants;

/// Configuration for the realtime client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the backend (`http(s)://host[:port]`).
    pub server_url: String,
    /// Delay before the first reconnect attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Ceiling for the reconnect delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Reconnect attempts before giving up until the next `connect`.
    pub max_reconnect_attempts: u32,
    /// Seconds to wait for `auth_ack` after the socket opens.
    pub auth_timeout_secs: u64,
    /// Directory for locally persisted state (chat watermarks).
    pub state_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let state_dir = Self::config_dir_path()
            .map(|dir| dir.join("state"))
            .unwrap_or_else(|_| PathBuf::from("orderwire-state"));

        Self {
            server_url: constants::DEFAULT_SERVER_URL.to_string(),
            initial_backoff_ms: constants::INITIAL_BACKOFF.as_millis() as u64,
            max_backoff_ms: constants::MAX_BACKOFF.as_millis() as u64,
            max_reconnect_attempts: constants::MAX_RECONNECT_ATTEMPTS,
            auth_timeout_secs: constants::AUTH_ACK_TIMEOUT.as_secs(),
            state_dir,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `tmp/orderwire-test`
    /// 2. `ORDERWIRE_CONFIG_DIR` env var: explicit override
    /// 3. `ORDERWIRE_ENV=test`: `tmp/orderwire-test` (integration tests)
    /// 4. Default: platform config dir (Linux: ~/.config/orderwire)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = Self::config_dir_path()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config dir {}", dir.display()))?;
        Ok(dir)
    }

    fn config_dir_path() -> Result<PathBuf> {
        #[cfg(test)]
        {
            Ok(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/orderwire-test"))
        }

        #[cfg(not(test))]
        {
            if let Ok(dir) = std::env::var("ORDERWIRE_CONFIG_DIR") {
                Ok(PathBuf::from(dir))
            } else if crate::env::is_test_mode() {
                Ok(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/orderwire-test"))
            } else {
                Ok(dirs::config_dir()
                    .context("Could not determine config directory")?
                    .join("orderwire"))
            }
        }
    }

    /// Loads configuration from the config dir, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join("config.json");
        let mut config = Self::load_from(&path).unwrap_or_else(|e| {
            log::debug!("Using default config ({e:#})");
            Self::default()
        });
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from an explicit file, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Config file not found: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Applies `ORDERWIRE_*` overrides resolved through `lookup`.
    ///
    /// Unparseable numeric values are ignored and the existing value kept.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(server_url) = lookup("ORDERWIRE_SERVER_URL") {
            self.server_url = server_url;
        }

        if let Some(attempts) = lookup("ORDERWIRE_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse::<u32>() {
                self.max_reconnect_attempts = attempts;
            }
        }

        if let Some(timeout) = lookup("ORDERWIRE_AUTH_TIMEOUT") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.auth_timeout_secs = timeout;
            }
        }

        if let Some(state_dir) = lookup("ORDERWIRE_STATE_DIR") {
            self.state_dir = PathBuf::from(state_dir);
        }
    }

    /// Persists the configuration to `config.json` in the config dir and
    /// returns the file written.
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_dir()?.join("config.json");
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Persists the configuration to an explicit file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Reconnect schedule derived from the backoff settings.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial: Duration::from_millis(self.initial_backoff_ms),
            max: Duration::from_millis(self.max_backoff_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    /// Deadline for `auth_ack` after the socket opens.
    #[must_use]
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    /// Full URL of the realtime endpoint (`ws(s)://host/ws`).
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!(
            "{}{}",
            crate::ws::http_to_ws_scheme(self.server_url.trim_end_matches('/')),
            constants::WS_PATH
        )
    }
}
