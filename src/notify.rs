//! User-facing notification when a connection goes away.

use std::fmt;

/// Why a connection was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` or `cleanup()` was called by the owner, or the value was dropped.
    Requested,
    /// The peer closed the stream (zero-length read).
    PeerClosed,
    /// A read failed with something other than a timeout.
    ReadFailed,
    /// The dispatcher returned `false` for a frame.
    DispatchRejected,
    /// A write failed with a non-transient error.
    SendFailed,
    /// The serialized executor stopped accepting drain tasks.
    ExecutorClosed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Requested => "closed by request",
            Self::PeerClosed => "closed by peer",
            Self::ReadFailed => "read failed",
            Self::DispatchRejected => "dispatcher rejected a frame",
            Self::SendFailed => "send failed",
            Self::ExecutorClosed => "executor shut down",
        };
        f.write_str(text)
    }
}

/// Surfaces connection loss to the user.
///
/// Called at most once per teardown, and only when the teardown asked for a
/// warning.
pub trait Notifier: Send + Sync {
    fn connection_closed(&self, reason: CloseReason);
}

impl<F> Notifier for F
where
    F: Fn(CloseReason) + Send + Sync,
{
    fn connection_closed(&self, reason: CloseReason) {
        self(reason)
    }
}

/// Default notifier: logs a warning through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn connection_closed(&self, reason: CloseReason) {
        tracing::warn!(
            %reason,
            "Connection to server has been closed. Reconnect before sending additional updates."
        );
    }
}
