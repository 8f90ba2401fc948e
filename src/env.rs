//! Runtime environment detection.
//!
//! Reads `ORDERWIRE_ENV` once per call and classifies the process as
//! production, development or test. Test mode keeps persisted state
//! (config, watermarks) inside the repository's `tmp/` directory instead of
//! the user's platform config directory.
//!
//! Recognised values:
//! - `test` - integration tests and CI
//! - `development` or `dev` - local development, logs at `debug` by default
//! - anything else or unset - production

/// Runtime environment for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment (default).
    Production,
    /// Development environment.
    Development,
    /// Test environment - state lives under the repo's `tmp/`.
    Test,
}

impl Environment {
    /// Detect the current environment from `ORDERWIRE_ENV`.
    #[must_use]
    pub fn current() -> Self {
        Self::parse(std::env::var("ORDERWIRE_ENV").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("test") => Self::Test,
            Some("development" | "dev") => Self::Development,
            _ => Self::Production,
        }
    }

    /// Returns `true` in the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }

    /// Log filter used when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_log_filter(self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Production | Self::Test => "info",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Convenience check for `ORDERWIRE_ENV=test`.
#[must_use]
pub fn is_test_mode() -> bool {
    Environment::current().is_test()
}
