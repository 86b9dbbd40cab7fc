//! Reliable write loop.
//!
//! A single `write` may accept only part of a buffer. The loop writes from
//! the front of the framed buffer, drops whatever was accepted with
//! [`shift_n`], and retries with the remainder, so bytes always reach the
//! wire in their original order.

use std::io::{self, Write};
use std::thread;

use bytes::BytesMut;

use crate::protocol::shift_n;

/// Errors that only mean "try the same write again".
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

/// Write every byte of `buf`, consuming it.
///
/// Returns the number of `write` calls it took. On error `buf` holds the bytes
/// that were not sent.
pub fn write_fully<W: Write + ?Sized>(writer: &mut W, buf: &mut BytesMut) -> io::Result<usize> {
    let mut writes = 0;

    while !buf.is_empty() {
        match writer.write(&buf[..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "socket accepted no bytes",
                ))
            }
            Ok(n) => {
                writes += 1;
                shift_n(buf, n);
                if !buf.is_empty() {
                    tracing::trace!(sent = n, remaining = buf.len(), "short send");
                }
            }
            Err(e) if is_transient(&e) => thread::yield_now(),
            Err(e) => return Err(e),
        }
    }

    writer.flush()?;
    Ok(writes)
}
