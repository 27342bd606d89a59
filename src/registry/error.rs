//! Registry error types
//!
//! Error types for stream registry operations.

use super::path::{SessionId, StreamPath};

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Stream already has a publisher
    StreamAlreadyPublishing(StreamPath),
    /// No publisher is registered for the stream
    StreamNotFound(StreamPath),
    /// Session is not (or no longer) registered
    SessionNotFound(SessionId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::StreamAlreadyPublishing(path) => {
                write!(f, "Already has a stream publish to {}", path)
            }
            RegistryError::StreamNotFound(path) => write!(f, "Stream not found: {}", path),
            RegistryError::SessionNotFound(id) => write!(f, "Session not found: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
