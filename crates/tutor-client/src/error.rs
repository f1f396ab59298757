use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("gateway error: {0}")]
    Gateway(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("subscription to {channel} refused: {reason}")]
    Subscription { channel: String, reason: String },

    #[error("gateway closed the connection")]
    Disconnected,

    #[error("timed out waiting for the gateway")]
    Timeout,
}
