use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::codec::{decode_frames, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;
/// Upper bound on chunks pulled per [`FrameReader::fill_from`] call, so one
/// busy peer cannot starve the rest of a worker iteration.
const MAX_CHUNKS_PER_FILL: usize = 64;

/// Read buffer for a non-blocking stream.
///
/// Accumulates raw bytes until at least one frame is complete. May hold
/// several complete frames plus one trailing partial frame.
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    config: FrameConfig,
}

impl FrameReader {
    /// Create a new frame reader with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Pull whatever `src` has available without blocking.
    ///
    /// Returns the number of bytes read (0 if nothing was ready).
    /// Returns `Err(FrameError::ConnectionClosed)` when the peer closed the stream.
    pub fn fill_from<R: Read>(&mut self, src: &mut R) -> Result<usize> {
        let mut total = 0usize;
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        for _ in 0..MAX_CHUNKS_PER_FILL {
            match src.read(&mut chunk) {
                // Hand over what arrived before EOF; the next fill reports it.
                Ok(0) if total > 0 => break,
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    total += n;
                    if n < chunk.len() {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        Ok(total)
    }

    /// Take every complete frame out of the buffer.
    ///
    /// A length prefix above the configured maximum is an error; the
    /// connection should be dropped rather than buffering without bound.
    /// Frames ahead of such a prefix are handed out first, so callers drain
    /// until they get an empty batch or the error.
    pub fn drain_frames(&mut self) -> Result<Vec<Bytes>> {
        let frames = decode_frames(&mut self.buf, self.config.max_payload_size)?;
        if !frames.is_empty() {
            trace!(frames = frames.len(), remaining = self.buf.len(), "frames drained");
        }
        Ok(frames)
    }

    /// Forget buffered bytes (used when a connection is replaced).
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Bytes currently buffered, including any partial frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}
