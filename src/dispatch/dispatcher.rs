//! The consumer-side capability invoked once per inbound frame.

use bytes::Bytes;

/// Handles one inbound payload on the serialized executor.
///
/// The payload excludes the length prefix; its first 4 bytes are
/// conventionally the command id. Returning `false` means the connection
/// should be treated as broken: the remaining queued frames are dropped and
/// the connection is torn down with a warning.
///
/// Closures of the form `Fn(Bytes) -> bool` implement this trait.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use framewire::Dispatcher;
///
/// let dispatcher = |payload: Bytes| payload.len() >= 4;
/// assert!(dispatcher.dispatch(Bytes::from_static(&[0, 0, 0, 7])));
/// assert!(!dispatcher.dispatch(Bytes::new()));
/// ```
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatch(&self, payload: Bytes) -> bool;
}

impl<F> Dispatcher for F
where
    F: Fn(Bytes) -> bool + Send + Sync + 'static,
{
    fn dispatch(&self, payload: Bytes) -> bool {
        self(payload)
    }
}
