//! Error types for the cache coordinator and its repositories.

use thiserror::Error;

use crate::cache::level::CacheLevel;

/// A failure inside a single tier's repository call.
///
/// These never escape the coordinator's public read/write surface; they are
/// logged, counted against the tier's circuit breaker and handed to the
/// registered error handlers.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Circuit open for tier {0}")]
    CircuitOpen(CacheLevel),

    #[error("Tier {0} has no repository")]
    Detached(CacheLevel),
}

impl RepositoryError {
    /// Stable name used to look up registered error handlers.
    pub fn kind(&self) -> &'static str {
        match self {
            RepositoryError::Io(_) => "io",
            RepositoryError::Serialization(_) => "serialization",
            RepositoryError::Unavailable(_) | RepositoryError::Detached(_) => "unavailable",
            RepositoryError::Backend(_) => "backend",
            RepositoryError::CircuitOpen(_) => "circuit_open",
        }
    }
}

/// Caller-visible errors. Tier faults are not among them.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("Invalid invalidation pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Unknown cache level: {0}")]
    UnknownLevel(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Feature disabled: {0}")]
    FeatureDisabled(&'static str),

    #[error("Value producer failed: {0}")]
    Producer(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;
