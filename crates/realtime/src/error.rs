//! Error types for the realtime layer

use thiserror::Error;

pub type RealtimeResult<T> = Result<T, RealtimeError>;

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Invalid WebSocket URL: {0}")]
    InvalidUrl(String),

    #[error("Socket {socket_id} is not open")]
    NotOpen { socket_id: u64 },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl From<url::ParseError> for RealtimeError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}
