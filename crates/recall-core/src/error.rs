use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Pipeline stage that owns a bounded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    Lexical,
    Vector,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Embedding => "embedding",
            Stage::Lexical => "lexical lookup",
            Stage::Vector => "vector lookup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("{stage} exceeded its {limit:?} bound")]
    LookupTimeout { stage: Stage, limit: Duration },

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Search cancelled")]
    Cancelled,

    #[error("Index failure: {0}")]
    Index(String),

    #[error("Embedding failure: {0}")]
    Embedding(String),
}

/// Stable classification handed to callers of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    IndexUnavailable,
    LookupTimeout,
    CacheUnavailable,
    Cancelled,
    Index,
    Embedding,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) | Error::DimensionMismatch { .. } => ErrorKind::Configuration,
            Error::IndexUnavailable(_) => ErrorKind::IndexUnavailable,
            Error::LookupTimeout { .. } => ErrorKind::LookupTimeout,
            Error::CacheUnavailable(_) => ErrorKind::CacheUnavailable,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Index(_) => ErrorKind::Index,
            Error::Embedding(_) => ErrorKind::Embedding,
        }
    }

    /// Only `IndexUnavailable` is worth retrying, and only by the caller.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::IndexUnavailable
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn index(err: impl fmt::Display) -> Self {
        Error::Index(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
