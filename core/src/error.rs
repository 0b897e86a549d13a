/// Error types for the chat client core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Remote write error: {0}")]
    RemoteWrite(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
