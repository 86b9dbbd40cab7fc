//! Serialized execution slots.
//!
//! The dispatcher may only run in one designated context: a host that owns
//! a UI thread or a single-threaded runtime hands the transport a way to
//! "run this task exclusively, eventually, once". The receiver thread never
//! calls the dispatcher itself; it only submits drain tasks here.
//!
//! Two implementations are provided:
//!
//! - [`ExecutorThread`]: a dedicated thread running tasks in submission order.
//! - [`HostPump`]: tasks wait in a channel until the host pumps them from its
//!   own thread or async task.
//!
//! ```text
//! Receiver thread ─► execute(task) ─► mpsc ─► single consumer ─► task()
//! ```

use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;

use crate::error::{Result, TransportError};

/// A unit of work for a serialized executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks one at a time, each exactly once, in submission order.
pub trait SerialExecutor: Send + Sync {
    /// Schedule `task`. Must not run it on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorClosed` if the executor no longer accepts tasks.
    fn execute(&self, task: Task) -> Result<()>;
}

impl<F> SerialExecutor for F
where
    F: Fn(Task) -> Result<()> + Send + Sync,
{
    fn execute(&self, task: Task) -> Result<()> {
        self(task)
    }
}

// ============================================================================
// Dedicated thread
// ============================================================================

/// A background thread that runs submitted tasks sequentially.
///
/// Dropping it (or calling [`shutdown`](Self::shutdown)) stops accepting
/// tasks, lets the already queued ones finish, and joins the thread.
#[derive(Debug)]
pub struct ExecutorThread {
    tx: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutorThread {
    /// Spawn the executor thread with the given name.
    pub fn spawn(name: &str) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Some(task) = rx.blocking_recv() {
                    task();
                }
                tracing::debug!("executor thread stopped");
            })
            .map_err(TransportError::Spawn)?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stop accepting tasks and wait for queued ones to finish.
    ///
    /// Safe to call more than once. When called from a task running on the
    /// executor itself the thread is detached instead of joined.
    pub fn shutdown(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl SerialExecutor for ExecutorThread {
    fn execute(&self, task: Task) -> Result<()> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            Some(tx) => tx.send(task).map_err(|_| TransportError::ExecutorClosed),
            None => Err(TransportError::ExecutorClosed),
        }
    }
}

impl Drop for ExecutorThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Host-driven pump
// ============================================================================

/// Executor whose tasks run only when the host pumps them.
///
/// The host decides which thread is the serialized context by being the one
/// that calls [`run_pending`](Self::run_pending) or awaits
/// [`run_next`](Self::run_next). Pumping from two places at once is
/// serialized by an internal lock. Tasks must not pump re-entrantly.
#[derive(Debug)]
pub struct HostPump {
    tx: mpsc::UnboundedSender<Task>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Task>>,
}

impl HostPump {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Run every task queued right now without waiting. Returns how many ran.
    ///
    /// Returns 0 if another caller is currently pumping.
    pub fn run_pending(&self) -> usize {
        let Ok(mut rx) = self.rx.try_lock() else {
            return 0;
        };

        let mut ran = 0;
        while let Ok(task) = rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Wait for the next task and run it.
    pub async fn run_next(&self) {
        let mut rx = self.rx.lock().await;
        // self holds a sender, so the channel never closes
        if let Some(task) = rx.recv().await {
            task();
        }
    }
}

impl Default for HostPump {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialExecutor for HostPump {
    fn execute(&self, task: Task) -> Result<()> {
        self.tx.send(task).map_err(|_| TransportError::ExecutorClosed)
    }
}
