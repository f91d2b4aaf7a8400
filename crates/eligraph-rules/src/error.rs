use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building rules or loading rule sets.
///
/// `Malformed` is always the caller's fault and is raised before anything touches a
/// store.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("malformed rule: {0}")]
    Malformed(String),
    #[error("failed to read rule set {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid rule set JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuleError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }

    /// Whether this error describes a bad rule shape (as opposed to I/O).
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}
