//! Chat errors.

use thiserror::Error;

/// Errors that can occur while talking to the model server or managing a conversation.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The request could not be sent or the response body could not be read.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single streamed record was not a valid chat event.
    #[error("Malformed stream record: {0}")]
    MalformedRecord(String),

    /// Nothing to send.
    #[error("Message is empty")]
    EmptyInput,

    /// A reply is still streaming.
    #[error("A reply is still streaming")]
    Busy,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Whether the user can simply try again.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::MalformedRecord(_) | Self::EmptyInput | Self::Busy
        )
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

/// Result type for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;
