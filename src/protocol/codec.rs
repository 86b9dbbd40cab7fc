//! Length-prefix frame codec.
//!
//! Every frame on the wire is a 4-byte big endian length followed by the
//! payload. The length counts its own 4 bytes:
//!
//! ```text
//! ┌────────────────────┬───────────────────────────┐
//! │ Length L           │ Payload                   │
//! │ 4 bytes, uint32 BE │ L - 4 bytes               │
//! └────────────────────┴───────────────────────────┘
//! ```
//!
//! The first 4 bytes of a payload are conventionally a command id. They are
//! opaque to the transport apart from statistics bookkeeping.
//!
//! All functions here are pure operations over a byte buffer. They tolerate
//! buffers holding a partial frame as well as several concatenated frames.
//!
//! # Example
//!
//! ```
//! use framewire::protocol::{extract_payload, frame, MAX_FRAME_SIZE};
//!
//! let mut wire = frame(&[0, 0, 0, 7]).unwrap();
//! assert_eq!(&wire[..], &[0, 0, 0, 8, 0, 0, 0, 7]);
//!
//! let payload = extract_payload(&mut wire, MAX_FRAME_SIZE).unwrap();
//! assert_eq!(&payload[..], &[0, 0, 0, 7]);
//! assert!(wire.is_empty());
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, TransportError};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest declared length accepted on receive.
///
/// Lengths are carried as unsigned integers but peers treat them as signed,
/// so anything above `i32::MAX` is never a valid frame.
pub const MAX_FRAME_SIZE: u32 = i32::MAX as u32;

#[inline]
fn read_u32_be(buf: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Declared length of the frame at the front of `buf`.
///
/// Returns `None` while fewer than 4 bytes are buffered.
#[inline]
pub fn required_size(buf: &[u8]) -> Option<u32> {
    read_u32_be(buf)
}

/// Declared length of the leading frame if it is acceptable.
///
/// A length is acceptable when it covers at least its own prefix and does not
/// exceed `max_frame_size` (itself capped at [`MAX_FRAME_SIZE`]).
fn valid_frame_len(buf: &[u8], max_frame_size: u32) -> Option<usize> {
    let declared = required_size(buf)?;
    let max = max_frame_size.min(MAX_FRAME_SIZE);
    if (declared as usize) < LENGTH_PREFIX_SIZE || declared > max {
        return None;
    }
    Some(declared as usize)
}

/// True when the leading declared length can never describe a frame.
///
/// The buffer will accumulate bytes forever without producing a payload.
pub fn has_invalid_length(buf: &[u8], max_frame_size: u32) -> bool {
    required_size(buf).is_some() && valid_frame_len(buf, max_frame_size).is_none()
}

/// Does `buf` start with a complete frame?
pub fn is_complete(buf: &[u8], max_frame_size: u32) -> bool {
    matches!(valid_frame_len(buf, max_frame_size), Some(len) if buf.len() >= len)
}

/// Remove the leading complete frame.
///
/// Returns the number of bytes removed, 0 when no complete frame is buffered.
pub fn shift_frame(buf: &mut BytesMut, max_frame_size: u32) -> usize {
    match valid_frame_len(buf, max_frame_size) {
        Some(len) if buf.len() >= len => {
            buf.advance(len);
            len
        }
        _ => 0,
    }
}

/// Remove exactly `n` bytes from the front.
///
/// Leaves the buffer untouched and returns `false` when `n` exceeds its length.
pub fn shift_n(buf: &mut BytesMut, n: usize) -> bool {
    if n > buf.len() {
        return false;
    }
    buf.advance(n);
    true
}

/// Split the leading complete frame off `buf` and return its payload.
///
/// The payload excludes the length prefix and no longer aliases the
/// accumulation buffer's writable region.
pub fn extract_payload(buf: &mut BytesMut, max_frame_size: u32) -> Option<Bytes> {
    let len = valid_frame_len(buf, max_frame_size).filter(|&len| buf.len() >= len)?;
    let mut frame = buf.split_to(len);
    frame.advance(LENGTH_PREFIX_SIZE);
    Some(frame.freeze())
}

/// Prefix a payload with its frame length.
///
/// # Errors
///
/// Returns `FrameTooLarge` if `payload.len() + 4` does not fit in a `u32`.
pub fn frame(payload: &[u8]) -> Result<BytesMut> {
    let size = payload.len() + LENGTH_PREFIX_SIZE;
    let declared = u32::try_from(size).map_err(|_| TransportError::FrameTooLarge { size })?;

    let mut out = BytesMut::with_capacity(size);
    out.put_u32(declared);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Command id carried in the first 4 bytes of an unprefixed payload.
#[inline]
pub fn command_id(payload: &[u8]) -> Option<u32> {
    read_u32_be(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(payload: &[u8]) -> BytesMut {
        frame(payload).unwrap()
    }

    #[test]
    fn test_frame_command_only_payload() {
        let framed = wire(&[0x00, 0x00, 0x00, 0x07]);
        assert_eq!(&framed[..], &[0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x07]);
    }

    #[test]
    fn test_frame_empty_payload() {
        let framed = wire(b"");
        assert_eq!(&framed[..], &[0, 0, 0, 4]);

        let mut buf = framed;
        let payload = extract_payload(&mut buf, MAX_FRAME_SIZE).unwrap();
        assert!(payload.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_required_size_needs_four_bytes() {
        assert_eq!(required_size(&[]), None);
        assert_eq!(required_size(&[0, 0, 0]), None);
        assert_eq!(required_size(&[0, 0, 1, 0]), Some(256));
        assert_eq!(required_size(&[0, 0, 0, 12, 0xFF]), Some(12));
    }

    #[test]
    fn test_is_complete_short_buffers() {
        for len in 0..LENGTH_PREFIX_SIZE {
            let buf = vec![0u8; len];
            assert!(!is_complete(&buf, MAX_FRAME_SIZE));
        }
    }

    #[test]
    fn test_is_complete_waits_for_declared_length() {
        let framed = wire(b"hello world");
        for cut in 0..framed.len() {
            assert!(!is_complete(&framed[..cut], MAX_FRAME_SIZE), "cut at {cut}");
        }
        assert!(is_complete(&framed, MAX_FRAME_SIZE));
    }

    #[test]
    fn test_is_complete_rejects_invalid_lengths() {
        // shorter than the prefix itself
        assert!(!is_complete(&[0, 0, 0, 0, 1, 2, 3, 4], MAX_FRAME_SIZE));
        assert!(!is_complete(&[0, 0, 0, 3, 1, 2, 3, 4], MAX_FRAME_SIZE));
        // negative when read as i32
        assert!(!is_complete(&[0x80, 0, 0, 4], MAX_FRAME_SIZE));
        assert!(!is_complete(&[0xFF, 0xFF, 0xFF, 0xFF], MAX_FRAME_SIZE));

        assert!(has_invalid_length(&[0, 0, 0, 2], MAX_FRAME_SIZE));
        assert!(!has_invalid_length(&[0, 0, 0, 9], MAX_FRAME_SIZE));
        assert!(!has_invalid_length(&[0, 0], MAX_FRAME_SIZE));
    }

    #[test]
    fn test_is_complete_respects_configured_max() {
        let framed = wire(&[0xAB; 100]);
        assert!(is_complete(&framed, 104));
        assert!(!is_complete(&framed, 103));
        assert!(has_invalid_length(&framed, 103));
    }

    #[test]
    fn test_shift_frame_keeps_remainder() {
        let mut buf = wire(b"first");
        buf.extend_from_slice(&wire(b"second")[..6]);

        assert_eq!(shift_frame(&mut buf, MAX_FRAME_SIZE), 9);
        assert_eq!(&buf[..], &[0, 0, 0, 10, b's', b'e']);

        // second frame still incomplete
        assert_eq!(shift_frame(&mut buf, MAX_FRAME_SIZE), 0);
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn test_shift_n() {
        let mut buf = BytesMut::from(&b"abcdef"[..]);
        assert!(shift_n(&mut buf, 2));
        assert_eq!(&buf[..], b"cdef");

        assert!(!shift_n(&mut buf, 5));
        assert_eq!(&buf[..], b"cdef");

        assert!(shift_n(&mut buf, 4));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_extract_payload_concatenated_frames() {
        let mut buf = wire(b"one");
        buf.extend_from_slice(&wire(b"two"));
        buf.extend_from_slice(&wire(b"three"));

        let mut payloads = Vec::new();
        while let Some(p) = extract_payload(&mut buf, MAX_FRAME_SIZE) {
            payloads.push(p);
        }

        assert_eq!(payloads, vec![&b"one"[..], &b"two"[..], &b"three"[..]]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_extracted_payload_survives_buffer_reuse() {
        let mut buf = wire(b"keep me");
        let payload = extract_payload(&mut buf, MAX_FRAME_SIZE).unwrap();

        buf.extend_from_slice(b"overwrite the buffer with other bytes");
        assert_eq!(&payload[..], b"keep me");
    }

    #[test]
    fn test_command_id() {
        assert_eq!(command_id(&[0, 0, 0, 7, 0xAA]), Some(7));
        assert_eq!(command_id(&[0x01, 0x02, 0x03, 0x04]), Some(0x0102_0304));
        assert_eq!(command_id(&[0, 0, 7]), None);
    }
}
