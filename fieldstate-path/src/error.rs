//! Error types for path parsing and tree writes

use thiserror::Error;

/// Result type for path operations
pub type Result<T> = std::result::Result<T, PathError>;

/// Errors that can occur while parsing a path or writing through one
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path string does not follow `segment(.segment)*` with optional `[n]` suffixes
    #[error("malformed path '{path}': {reason}")]
    Malformed { path: String, reason: String },

    /// A write tried to descend through a value of the wrong kind
    #[error("cannot write '{path}': segment '{segment}' descends into {found}")]
    ContainerMismatch {
        path: String,
        segment: String,
        found: &'static str,
    },

    /// A write would pad a sequence with too many `null`s
    #[error("cannot write '{path}': index {index} is more than {limit} past the end of its sequence")]
    IndexOutOfRange {
        path: String,
        index: usize,
        limit: usize,
    },
}

impl PathError {
    pub(crate) fn malformed(path: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
