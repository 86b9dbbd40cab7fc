//! Protocol module - wire format and framing.
//!
//! This module implements the length-prefixed framing used on the wire:
//! - 4-byte big endian length prefix that counts itself
//! - Frame buffer for accumulating partial reads

mod codec;
mod frame_buffer;

pub use codec::{
    command_id, extract_payload, frame, has_invalid_length, is_complete, required_size,
    shift_frame, shift_n, LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE,
};
pub use frame_buffer::FrameBuffer;
