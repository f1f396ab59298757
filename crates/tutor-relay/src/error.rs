use thiserror::Error;

/// Failures of the publish / authorize paths. Publish failures are logged
/// and dropped by `Publisher`; only channel authorization surfaces them.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay setting {0} is not configured")]
    NotConfigured(&'static str),

    #[error("invalid channel name: {0}")]
    InvalidChannel(String),

    #[error("invalid socket id: {0}")]
    InvalidSocketId(String),

    #[error("relay request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("relay rejected event ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}
