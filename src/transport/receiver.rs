//! Receiver worker: blocking reads on a dedicated thread.
//!
//! The worker owns the accumulation buffer. It reads the socket in fixed-size
//! chunks, extracts every complete payload and submits it to the
//! [`DispatchBridge`]. It never runs the dispatcher itself.
//!
//! Reads use a receive timeout so a worker blocked on a socket that has been
//! closed locally wakes within one interval, notices the bridge is shut down,
//! and exits.

use std::io::{self, Read};
use std::sync::Arc;

use crate::dispatch::DispatchBridge;
use crate::protocol::FrameBuffer;

/// Why the receive loop ended.
#[derive(Debug)]
pub enum WorkerExit {
    /// The connection was closed locally; nothing else to do.
    Closed,
    /// The peer closed the stream.
    PeerClosed,
    /// A read failed with a non-timeout error.
    ReadFailed(io::Error),
    /// A drain could not be scheduled.
    ExecutorClosed,
}

/// Read errors after which the read is simply retried. Receive timeouts
/// surface as `WouldBlock` on Unix and `TimedOut` on Windows.
fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Receive loop state for one connection session.
pub struct ReceiverWorker<R> {
    reader: R,
    frames: FrameBuffer,
    chunk_size: usize,
    bridge: Arc<DispatchBridge>,
}

impl<R: Read> ReceiverWorker<R> {
    pub fn new(reader: R, chunk_size: usize, max_frame_size: u32, bridge: Arc<DispatchBridge>) -> Self {
        Self {
            reader,
            frames: FrameBuffer::with_max_frame(max_frame_size),
            chunk_size: chunk_size.max(1),
            bridge,
        }
    }

    /// Read until the connection ends. Runs on the receiver thread.
    pub fn run(mut self) -> WorkerExit {
        let mut scratch = vec![0u8; self.chunk_size];
        let mut stall_reported = false;

        loop {
            if self.bridge.is_closed() {
                return WorkerExit::Closed;
            }

            let n = match self.reader.read(&mut scratch) {
                Ok(0) => return self.exit(WorkerExit::PeerClosed),
                Ok(n) => n,
                Err(e) if is_retryable(&e) => continue,
                Err(e) => return self.exit(WorkerExit::ReadFailed(e)),
            };

            for payload in self.frames.push(&scratch[..n]) {
                if let Err(e) = self.bridge.submit(payload) {
                    tracing::error!(error = %e, "unable to schedule dispatch");
                    return self.exit(WorkerExit::ExecutorClosed);
                }
            }

            if !stall_reported && self.frames.is_stalled() {
                tracing::warn!(
                    buffered = self.frames.len(),
                    "invalid frame length received, inbound stream stalled"
                );
                stall_reported = true;
            }
        }
    }

    /// A local close shows up as EOF or a read error; report it as `Closed`.
    fn exit(&self, exit: WorkerExit) -> WorkerExit {
        if self.bridge.is_closed() {
            WorkerExit::Closed
        } else {
            exit
        }
    }
}
