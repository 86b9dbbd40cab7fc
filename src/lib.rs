//! # framewire
//!
//! Length-prefixed framing transport over a single TCP connection.
//!
//! Every frame on the wire is a 4-byte big endian length that counts itself,
//! followed by the payload. The first 4 bytes of a payload are, by
//! convention, a big endian command id.
//!
//! ## Architecture
//!
//! - **Receive path**: a dedicated thread reads the socket, reassembles frames
//!   and queues them; payloads are dispatched one at a time on a
//!   [`SerialExecutor`] chosen by the host
//! - **Send path**: callers frame and write synchronously; while disconnected,
//!   framed bytes go to an [`OfflineCache`] instead
//!
//! ## Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use framewire::{CommandStats, Connection, MemoryCache};
//! use std::sync::Arc;
//!
//! let cache = Arc::new(MemoryCache::new());
//! let conn = Connection::builder()
//!     .offline_cache(cache.clone())
//!     .stats(Arc::new(CommandStats::new(64)))
//!     .build()?;
//!
//! // queued in the cache, nothing is connected yet
//! conn.send(&[0, 0, 0, 1])?;
//!
//! conn.connect("localhost", 5042, |payload: Bytes| !payload.is_empty())?;
//! conn.send_all(cache.take())?;
//! # Ok::<(), framewire::TransportError>(())
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod notify;
pub mod offline;
pub mod protocol;
pub mod stats;
pub mod transport;

pub use config::ConnectionConfig;
pub use dispatch::{Dispatcher, ExecutorThread, HostPump, SerialExecutor};
pub use error::{Result, TransportError};
pub use notify::{CloseReason, Notifier, TracingNotifier};
pub use offline::{FileCache, MemoryCache, OfflineCache};
pub use stats::{CommandStats, StatsSnapshot};
pub use transport::{Connection, ConnectionBuilder, ConnectionState};
