use std::path::PathBuf;

use eligraph_rules::RuleError;
use thiserror::Error;

/// Errors surfaced by [`crate::RuleGraphStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is closed, or a session could not be opened in time.
    #[error("rule graph store unavailable: {0}")]
    Unavailable(String),

    /// The rule was rejected before anything was written.
    #[error(transparent)]
    Malformed(#[from] RuleError),

    /// The snapshot file could not be read, decoded or written.
    #[error("rule graph snapshot {path}: {message}")]
    Snapshot { path: PathBuf, message: String },
}

impl StoreError {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub(crate) fn snapshot(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Snapshot {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether the store itself (rather than the caller's input) is at fault.
    ///
    /// Snapshot failures count: a store whose backing file is unusable is unavailable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Snapshot { .. })
    }
}
