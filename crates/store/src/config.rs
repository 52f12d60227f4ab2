use std::time::Duration;

use anyhow::{Context, Result};
use fromenv::FromEnv;

/// Options used to connect to the SQL database.
///
/// This struct is used to load connection options from environment variables.
#[derive(Debug, Clone, FromEnv)]
pub struct ConnectOptions {
    /// Database path or URI.
    #[env(from = "SQL_DATABASE", default = "file::memory:?cache=shared")]
    pub database: String,

    /// Statements running longer than this many milliseconds are logged.
    #[env(from = "SQL_SLOW_REQUEST_MS", default = "200")]
    pub slow_request_ms: u64,
}

impl ConnectOptions {
    /// Options for a private in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            database: ":memory:".to_string(),
            slow_request_ms: 200,
        }
    }

    /// The slow statement threshold.
    #[must_use]
    pub const fn slow_request(&self) -> Duration {
        Duration::from_millis(self.slow_request_ms)
    }
}

impl crate::FromEnv for ConnectOptions {
    fn from_env() -> Result<Self> {
        Self::from_env().finalize().context("issue loading connection options")
    }
}
