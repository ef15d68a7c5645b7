use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: big-endian payload length (4) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Encode one payload into the wire format, appending to `dst`.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────┐
/// │ Length (4B)  │ Payload          │
/// │ big-endian   │ (Length bytes)   │
/// └──────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame from the front of `src`.
///
/// Returns `Ok(None)` if `src` doesn't hold a complete frame yet, leaving it
/// untouched. On success the frame bytes are consumed from `src`.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&src[..HEADER_SIZE]);
    let payload_len = u32::from_be_bytes(header) as usize;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Decode every complete frame in `src`.
///
/// Whatever remains in `src` afterwards is the remainder: empty, or the
/// prefix of a frame that has not fully arrived. Calling again after
/// appending more bytes resumes exactly where this call stopped.
///
/// An oversized prefix is left in `src`. Frames that precede it are returned
/// first and the error surfaces on the next call.
pub fn decode_frames(src: &mut BytesMut, max_payload: usize) -> Result<Vec<Bytes>> {
    let mut frames = Vec::new();
    loop {
        match decode_frame(src, max_payload) {
            Ok(Some(frame)) => frames.push(frame),
            Ok(None) => return Ok(frames),
            Err(err) if frames.is_empty() => return Err(err),
            Err(_) => return Ok(frames),
        }
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes, both directions. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let payload = b"hello, camlink!";

        encode_frame(payload, &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE + payload.len());
        assert_eq!(&buf[..HEADER_SIZE], &(payload.len() as u32).to_be_bytes());

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();

        assert_eq!(frame.as_ref(), payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32(1024 * 1024 * 32); // 32 MiB

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf).unwrap();
        encode_frame(b"second", &mut buf).unwrap();

        let frames = decode_frames(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref(), b"first");
        assert_eq!(frames[1].as_ref(), b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_complete_frame_then_truncated_frame() {
        let mut full = BytesMut::new();
        encode_frame(b"complete", &mut full).unwrap();
        let mut second = BytesMut::new();
        encode_frame(b"truncated-second", &mut second).unwrap();
        let cut = second.len() - 5;
        full.extend_from_slice(&second[..cut]);

        let frames = decode_frames(&mut full, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"complete");
        assert_eq!(full.as_ref(), &second[..cut]);

        // Resuming with the rest yields the second frame exactly once.
        full.extend_from_slice(&second[cut..]);
        let frames = decode_frames(&mut full, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"truncated-second");
        assert!(full.is_empty());
    }

    #[test]
    fn test_frame_before_oversized_prefix_is_kept() {
        let mut buf = BytesMut::new();
        encode_frame(b"ok", &mut buf).unwrap();
        buf.put_u32(64);
        buf.put_slice(b"junk");

        let frames = decode_frames(&mut buf, 8).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"ok");
        assert_eq!(buf.len(), HEADER_SIZE + 4);

        let result = decode_frames(&mut buf, 8);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { size: 64, max: 8 })));
    }

    #[test]
    fn test_byte_at_a_time_reassembly() {
        let mut wire = BytesMut::new();
        encode_frame(b"one", &mut wire).unwrap();
        encode_frame(b"", &mut wire).unwrap();
        encode_frame(b"three", &mut wire).unwrap();

        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        for byte in wire.iter() {
            buf.put_u8(*byte);
            frames.extend(decode_frames(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap());
        }

        let frames: Vec<&[u8]> = frames.iter().map(|f| f.as_ref()).collect();
        assert_eq!(frames, vec![&b"one"[..], &b""[..], &b"three"[..]]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(b"", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0, 0, 0, 0]);

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert!(frame.is_empty());
    }
}
