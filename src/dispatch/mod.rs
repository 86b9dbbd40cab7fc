//! Dispatch module - bridging the receiver thread to the serialized consumer.
//!
//! ```text
//! Receiver thread ─► DispatchQueue ─► SerialExecutor ─► drain ─► Dispatcher
//! ```
//!
//! - [`DispatchQueue`]: the only state shared between the two contexts
//! - [`DispatchBridge`]: schedules drains and runs them
//! - [`SerialExecutor`]: the host's "run exclusively, eventually, once" slot
//! - [`Dispatcher`]: the per-frame consumer capability

mod bridge;
mod dispatcher;
mod executor;
mod queue;

pub use bridge::{DispatchBridge, DrainOutcome, RejectHook};
pub use dispatcher::Dispatcher;
pub use executor::{ExecutorThread, HostPump, SerialExecutor, Task};
pub use queue::DispatchQueue;
