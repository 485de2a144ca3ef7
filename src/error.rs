use thiserror::Error;

/// Errors raised inside the chat core. None of these escape to the embedding
/// UI as panics; callers observe state transitions instead.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Not connected")]
    NotConnected,

    #[error("Unsupported storage type: {0}")]
    UnsupportedStorage(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Invalid configuration: {0}")]
    Config(String),
}
