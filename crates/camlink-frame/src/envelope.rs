//! Application envelopes and the heartbeat sentinel.
//!
//! An envelope payload is `correlation id (16 bytes) ‖ body`. A heartbeat
//! payload is exactly [`HEARTBEAT`]. The sentinel is shorter than a
//! correlation ID, so no envelope can ever be mistaken for a heartbeat.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::{FrameError, Result};

/// Length of a correlation ID on the wire.
pub const ID_LEN: usize = 16;

/// Heartbeat payload. Never JSON, never carries a correlation ID.
pub const HEARTBEAT: &[u8] = b"\xffcamlink-hb";

/// True if `payload` is a heartbeat.
pub fn is_heartbeat(payload: &[u8]) -> bool {
    payload == HEARTBEAT
}

/// 128-bit identifier pairing a request with its response.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId([u8; ID_LEN]);

impl CorrelationId {
    /// A fresh random (UUID v4) identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Read the identifier from the front of a payload, if it is long enough.
    pub fn from_prefix(payload: &[u8]) -> Option<Self> {
        let prefix: [u8; ID_LEN] = payload.get(..ID_LEN)?.try_into().ok()?;
        Some(Self(prefix))
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0).hyphenated())
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({self})")
    }
}

/// A correlated application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub id: CorrelationId,
    pub body: Bytes,
}

impl Envelope {
    pub fn new(id: CorrelationId, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            body: body.into(),
        }
    }

    /// Wire payload: `id ‖ body`.
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ID_LEN + self.body.len());
        buf.put_slice(&self.id.0);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Split a frame payload into identifier and body.
    pub fn parse(mut payload: Bytes) -> Result<Self> {
        let id = CorrelationId::from_prefix(&payload).ok_or(FrameError::MissingCorrelationId {
            len: payload.len(),
        })?;
        let body = payload.split_off(ID_LEN);
        Ok(Self { id, body })
    }
}
