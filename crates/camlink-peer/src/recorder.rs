//! The recording collaborator driven by the client role.
//!
//! camlink never builds a recorder. The camera process passes one in; when
//! its capture loop needs the same recorder, pass a cloneable handle whose
//! clones share state.

/// Failure reported by a recorder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RecorderError(pub String);

impl RecorderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A finished recording segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub data: Vec<u8>,
}

/// Operations the client role invokes on behalf of remote requests.
///
/// Called only from the link worker thread.
pub trait Recorder: Send + 'static {
    fn is_recording(&self) -> bool;

    fn start_recording(&mut self) -> Result<(), RecorderError>;

    fn stop_recording(&mut self) -> Result<(), RecorderError>;

    /// Current composed frame encoded as `format`, base64, or `None` when no
    /// frame is available yet.
    fn current_frame_base64(&mut self, format: &str) -> Result<Option<String>, RecorderError>;

    /// Newest finished segment. Recorders without segment support keep the default.
    fn latest_segment(&mut self) -> Result<Option<Segment>, RecorderError> {
        Ok(None)
    }
}
