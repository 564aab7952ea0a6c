use thiserror::Error;

/// Errors reported by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached or refused the command.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
