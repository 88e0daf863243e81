//! Client error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Every configured base URL failed at the network level
    #[error("No backend reachable (tried {tried}): {last}")]
    Unreachable { tried: usize, last: String },

    /// 401; the session has been cleared and the user must log in again
    #[error("{0}")]
    Unauthorized(String),

    /// Non-2xx answer; `message` is the server's own text
    #[error("{message}")]
    Server { status: u16, message: String },

    /// Operation needs a logged-in user
    #[error("Not logged in")]
    NoSession,

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    /// Status code for errors that came back from the server
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized(_) => Some(401),
            ClientError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}
