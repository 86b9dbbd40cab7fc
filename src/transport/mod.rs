//! Transport module - TCP socket handling.
//!
//! Provides:
//! - Name resolution preferring IPv4
//! - The receiver worker that reads the socket on its own thread
//! - The reliable write loop used for outbound frames
//! - [`Connection`], which ties the above to one socket's lifecycle

mod connection;
mod receiver;
mod resolve;
mod sender;

pub use connection::{Connection, ConnectionBuilder, ConnectionState};
pub use receiver::{ReceiverWorker, WorkerExit};
pub use resolve::resolve;
pub use sender::write_fully;
