//! Length-prefixed message framing for camlink links.
//!
//! Every message on the wire is framed with a 4-byte big-endian payload
//! length followed by exactly that many payload bytes. On top of frames:
//! - application payloads are envelopes: a 16-byte correlation ID + JSON body
//! - heartbeats are frames carrying a fixed sentinel and nothing else
//!
//! [`FrameReader`] and [`FrameWriter`] hold the read and write buffers of a
//! non-blocking connection. Neither ever discards or duplicates bytes of a
//! frame that is still deliverable.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, decode_frames, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use envelope::{is_heartbeat, CorrelationId, Envelope, HEARTBEAT, ID_LEN};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
