use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Env var naming the snapshot file of a file-backed store.
pub const ENV_STORE_PATH: &str = "ELIGRAPH_STORE";
/// Env var overriding the session lock timeout, in milliseconds.
pub const ENV_LOCK_TIMEOUT_MS: &str = "ELIGRAPH_LOCK_TIMEOUT_MS";

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a [`crate::RuleGraphStore`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Snapshot file; `None` keeps the graph in memory only
    pub path: Option<PathBuf>,
    /// How long a session waits for the graph lock before giving up
    pub lock_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Read `ELIGRAPH_STORE` / `ELIGRAPH_LOCK_TIMEOUT_MS`, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var(ENV_STORE_PATH) {
            if !path.trim().is_empty() {
                config.path = Some(PathBuf::from(path));
            }
        }

        if let Ok(raw) = std::env::var(ENV_LOCK_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.lock_timeout = Duration::from_millis(ms),
                Err(err) => tracing::warn!(
                    value = %raw,
                    error = %err,
                    "ignoring invalid {ENV_LOCK_TIMEOUT_MS}"
                ),
            }
        }

        config
    }
}
