use std::time::Duration;

/// Errors that can occur in link and role operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] camlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] camlink_frame::FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// No response arrived before the deadline. The remote action may or may
    /// not have happened.
    #[error("request timed out after {0:?}; remote state unknown")]
    Timeout(Duration),

    /// Nothing was received from the peer within the liveness window.
    #[error("no activity from peer for {0:?}")]
    HeartbeatTimeout(Duration),

    /// The link has been stopped.
    #[error("link stopped")]
    Stopped,

    /// Configuration rejected by validation.
    #[error("invalid link config: {0}")]
    InvalidConfig(String),

    /// The request name is not one this side knows how to route.
    #[error("unknown request: {0}")]
    UnknownRequest(String),

    /// The peer answered with an error envelope.
    #[error("remote error: {0}")]
    Remote(String),

    /// The peer answered with a body that is neither a value nor an error.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The local recording collaborator failed.
    #[error("recorder error: {0}")]
    Recorder(#[from] crate::recorder::RecorderError),
}

pub type Result<T> = std::result::Result<T, PeerError>;
