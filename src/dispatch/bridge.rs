//! Hand-off from the receiver thread to the serialized executor.
//!
//! The receiver thread calls [`DispatchBridge::submit`] for each payload. The
//! first payload to land in an empty queue schedules one drain task; the drain
//! then dispatches everything queued up to that point, including payloads that
//! arrive while it is running. A payload arriving after the drain observed an
//! empty queue finds the queue empty again and schedules the next drain, so
//! nothing is left behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use super::{DispatchQueue, Dispatcher, SerialExecutor};
use crate::error::Result;
use crate::protocol::command_id;
use crate::stats::CommandStats;

/// Callback invoked on the executor when the dispatcher rejects a frame.
pub type RejectHook = Box<dyn Fn() + Send + Sync>;

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Queue emptied; all payloads were accepted.
    Drained { dispatched: usize },
    /// The dispatcher returned `false`; the rest of the queue was dropped.
    Rejected { dispatched: usize, dropped: usize },
    /// The bridge was shut down before or during the drain.
    Closed { dispatched: usize },
}

/// Queue, dispatcher and executor for one connection session.
pub struct DispatchBridge {
    queue: DispatchQueue,
    dispatcher: Box<dyn Dispatcher>,
    executor: Arc<dyn SerialExecutor>,
    stats: Option<Arc<CommandStats>>,
    on_reject: RejectHook,
    closed: AtomicBool,
}

impl DispatchBridge {
    pub fn new(
        dispatcher: Box<dyn Dispatcher>,
        executor: Arc<dyn SerialExecutor>,
        stats: Option<Arc<CommandStats>>,
        on_reject: RejectHook,
    ) -> Self {
        Self {
            queue: DispatchQueue::new(),
            dispatcher,
            executor,
            stats,
            on_reject,
            closed: AtomicBool::new(false),
        }
    }

    /// Queue a payload, scheduling a drain if the queue was empty.
    ///
    /// Payloads submitted after [`shutdown`](Self::shutdown) are discarded.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorClosed` if a drain was needed but the executor refused
    /// it. No later drain can be scheduled for this bridge.
    pub fn submit(self: &Arc<Self>, payload: Bytes) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        if self.queue.enqueue(payload) {
            let bridge = Arc::clone(self);
            self.executor.execute(Box::new(move || {
                bridge.drain();
            }))?;
        }
        Ok(())
    }

    /// Dispatch queued payloads in order until the queue is empty.
    ///
    /// Must run on the serialized executor.
    pub fn drain(&self) -> DrainOutcome {
        let mut dispatched = 0;

        while !self.is_closed() {
            let Some(payload) = self.queue.dequeue() else {
                tracing::trace!(dispatched, "drain complete");
                return DrainOutcome::Drained { dispatched };
            };

            if let (Some(stats), Some(command)) = (&self.stats, command_id(&payload)) {
                stats.record_received(command);
            }

            if !self.dispatcher.dispatch(payload) {
                if self.is_closed() {
                    // session already gone; its rejection no longer matters
                    return DrainOutcome::Closed { dispatched };
                }
                let dropped = self.queue.clear();
                tracing::warn!(dispatched, dropped, "connection to server severed at dispatch");
                (self.on_reject)();
                return DrainOutcome::Rejected { dispatched, dropped };
            }
            dispatched += 1;
        }

        DrainOutcome::Closed { dispatched }
    }

    /// Stop dispatching and drop anything still queued.
    ///
    /// Returns the number of payloads dropped.
    pub fn shutdown(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        self.queue.clear()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Payloads waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
