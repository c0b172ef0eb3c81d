use thiserror::Error;

/// Failures of the connection layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection attempt timed out")]
    ConnectTimeout,

    #[error("websocket connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection closed")]
    Closed,

    #[error("timed out waiting for `{message_type}` message")]
    WaitTimeout { message_type: String },
}

/// Failures of one upload attempt. Nothing here is retried internally.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server sent an explicit `error` message; its text and optional
    /// code are passed through verbatim.
    #[error("server error: {message}")]
    Server {
        message: String,
        code: Option<String>,
    },

    #[error("malformed server payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The server broke the handshake shape (e.g. an `ack` without an
    /// upload id).
    #[error("protocol violation: {0}")]
    Protocol(String),
}
