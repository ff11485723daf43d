//! Error types for the chat client.

use thiserror::Error;

/// Result type alias for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Main error type for the chat client
#[derive(Debug, Error)]
pub enum ChatError {
    /// A history, send or listing backend failed
    #[error("Backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unknown pending message: {id}")]
    UnknownPending { id: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Draft storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ChatError {
    /// Wrap an error raised by a backend implementation
    pub fn backend(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(error))
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an unknown-pending error
    pub fn unknown_pending(id: impl Into<String>) -> Self {
        Self::UnknownPending { id: id.into() }
    }
}
