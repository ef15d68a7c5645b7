use std::collections::VecDeque;
use std::io::{ErrorKind, Write};

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::codec::{encode_frame, FrameConfig};
use crate::error::{FrameError, Result};

/// Write buffer for a non-blocking stream.
///
/// Frames are encoded on [`push`](FrameWriter::push) and kept in order. A
/// flush writes as much as the stream accepts; bytes leave the buffer only
/// once the stream took them, so a partial send on the same connection
/// resumes with the unsent suffix. Across a reconnect the head frame is
/// rewound and sent whole.
#[derive(Debug)]
pub struct FrameWriter {
    frames: VecDeque<Bytes>,
    /// Bytes of the head frame already written.
    offset: usize,
    queued: usize,
    config: FrameConfig,
}

impl FrameWriter {
    /// Create a new frame writer with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            frames: VecDeque::new(),
            offset: 0,
            queued: 0,
            config,
        }
    }

    /// Encode and enqueue a payload.
    pub fn push(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        let mut buf = BytesMut::new();
        encode_frame(payload, &mut buf)?;
        self.queued += buf.len();
        self.frames.push_back(buf.freeze());
        Ok(())
    }

    /// Write queued bytes until the stream would block or the queue is empty.
    ///
    /// Returns the number of bytes the stream accepted.
    pub fn flush_to<W: Write>(&mut self, dst: &mut W) -> Result<usize> {
        let mut written = 0usize;

        while let Some(head) = self.frames.front() {
            match dst.write(&head[self.offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.offset += n;
                    self.queued -= n;
                    written += n;
                    if self.offset == head.len() {
                        self.frames.pop_front();
                        self.offset = 0;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        if written > 0 {
            trace!(bytes = written, pending = self.frames.len(), "frames flushed");
        }
        Ok(written)
    }

    /// Rewind a head frame that was partly written to a connection that is gone.
    ///
    /// The next connection starts on a frame boundary and receives the whole
    /// frame again; the old peer never saw it complete. Returns true if a
    /// frame was rewound.
    pub fn rewind_partial(&mut self) -> bool {
        if self.offset == 0 {
            return false;
        }
        debug!(
            sent = self.offset,
            frame_len = self.frames.front().map(|head| head.len()).unwrap_or(0),
            "rewinding partly written frame"
        );
        self.queued += self.offset;
        self.offset = 0;
        true
    }

    /// True while the head frame is partly written.
    pub fn is_mid_frame(&self) -> bool {
        self.offset > 0
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames not yet completely written.
    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    /// Bytes not yet written.
    pub fn queued_bytes(&self) -> usize {
        self.queued
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}
