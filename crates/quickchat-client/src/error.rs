//! Client error types

use quickchat_common::SendMessageInput;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The message store did not accept the message. The unsent input is
    /// handed back so it can be restored in the composer.
    #[error("message was not sent: {reason}")]
    Persistence {
        reason: String,
        unsent: SendMessageInput,
    },

    #[error("nothing to send")]
    EmptyMessage,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("live channel error: {0}")]
    Live(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Unsent input of a failed send, if this is one.
    pub fn unsent(&self) -> Option<&SendMessageInput> {
        match self {
            ClientError::Persistence { unsent, .. } => Some(unsent),
            _ => None,
        }
    }
}
