//! Accumulation buffer for partial reads.
//!
//! Socket reads return arbitrary slices of the byte stream: half a length
//! prefix, a frame and a half, several frames at once. `FrameBuffer` keeps the
//! unconsumed tail between reads in a single `bytes::BytesMut` and hands out
//! every payload that became complete, in wire order.
//!
//! # Example
//!
//! ```
//! use framewire::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // 8-byte frame carrying command id 7, delivered in two reads
//! assert!(buffer.push(&[0, 0, 0]).is_empty());
//! let payloads = buffer.push(&[8, 0, 0, 0, 7]);
//!
//! assert_eq!(payloads.len(), 1);
//! assert_eq!(&payloads[0][..], &[0, 0, 0, 7]);
//! ```

use bytes::{Bytes, BytesMut};

use super::codec::{extract_payload, has_invalid_length, MAX_FRAME_SIZE};

/// Initial capacity of the accumulation buffer.
const DEFAULT_CAPACITY: usize = 4 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete payloads.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Bytes received but not yet consumed as part of a frame.
    buffer: BytesMut,
    /// Largest declared length treated as a frame.
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer accepting frames up to [`MAX_FRAME_SIZE`].
    pub fn new() -> Self {
        Self::with_max_frame(MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with a custom frame size limit.
    pub fn with_max_frame(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_CAPACITY),
            max_frame_size,
        }
    }

    /// Append freshly read bytes and extract every complete payload.
    ///
    /// Returned payloads exclude the length prefix and are ordered as they
    /// appeared on the wire. Any trailing partial frame stays buffered for the
    /// next push.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(data);

        let mut payloads = Vec::new();
        while let Some(payload) = extract_payload(&mut self.buffer, self.max_frame_size) {
            payloads.push(payload);
        }
        payloads
    }

    /// True when the leading length prefix is invalid.
    ///
    /// Nothing after it will ever be extracted.
    pub fn is_stalled(&self) -> bool {
        has_invalid_length(&self.buffer, self.max_frame_size)
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
