/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// An application payload is shorter than a correlation ID.
    #[error("payload of {len} bytes cannot carry a correlation id")]
    MissingCorrelationId { len: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
