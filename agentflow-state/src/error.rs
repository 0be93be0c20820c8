// ABOUTME: Error types for the state persistence crate
// ABOUTME: Distinguishes missing keys from backend and serialization failures

use thiserror::Error;

/// Errors raised by state backends and the state manager.
#[derive(Debug, Error)]
pub enum StateError {
    /// The requested key has no stored value. Callers treat this as
    /// "no prior state" rather than a hard failure.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StateResult<T> = Result<T, StateError>;
