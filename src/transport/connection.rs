//! Connection lifecycle.
//!
//! A [`Connection`] owns at most one TCP socket at a time and walks through
//!
//! ```text
//! Disconnected ─► Connecting ─► Connected ─► Closing ─► Disconnected
//!                     │                                     ▲
//!                     └──────── resolve/connect error ──────┘
//! ```
//!
//! While connected, a receiver thread feeds inbound payloads to the
//! dispatcher through the configured [`SerialExecutor`]. Outbound payloads are
//! written synchronously on the caller's thread. While disconnected, outbound
//! payloads are framed and handed to the offline cache instead.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use framewire::Connection;
//!
//! let conn = Connection::builder().build()?;
//!
//! conn.connect("127.0.0.1", 5042, |payload: Bytes| {
//!     println!("received {} bytes", payload.len());
//!     true
//! })?;
//!
//! // command id 7, empty body
//! conn.send(&[0, 0, 0, 7])?;
//! conn.close();
//! # Ok::<(), framewire::TransportError>(())
//! ```

use std::fmt;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;

use super::receiver::{ReceiverWorker, WorkerExit};
use super::resolve::resolve;
use super::sender::write_fully;
use crate::config::ConnectionConfig;
use crate::dispatch::{DispatchBridge, Dispatcher, ExecutorThread, SerialExecutor};
use crate::error::{Result, TransportError};
use crate::notify::{CloseReason, Notifier, TracingNotifier};
use crate::offline::OfflineCache;
use crate::protocol::{command_id, frame};
use crate::stats::CommandStats;

/// Name of the executor thread spawned when none is supplied.
const DEFAULT_EXECUTOR_NAME: &str = "framewire-dispatch";

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
        };
        f.write_str(text)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whole milliseconds, rounding any non-zero remainder up.
fn millis_ceil(duration: Duration) -> u64 {
    duration.as_micros().div_ceil(1000) as u64
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for configuring and creating a [`Connection`].
pub struct ConnectionBuilder {
    config: ConnectionConfig,
    executor: Option<Arc<dyn SerialExecutor>>,
    offline: Option<Arc<dyn OfflineCache>>,
    stats: Option<Arc<CommandStats>>,
    notifier: Arc<dyn Notifier>,
}

impl ConnectionBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ConnectionConfig::default(),
            executor: None,
            offline: None,
            stats: None,
            notifier: Arc::new(TracingNotifier),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the socket receive timeout. Sub-millisecond values round up to 1 ms.
    ///
    /// Default: 2 seconds
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.config.receive_timeout_ms = millis_ceil(timeout);
        self
    }

    /// Set a connect timeout.
    ///
    /// Default: none
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = Some(millis_ceil(timeout));
        self
    }

    /// Set the maximum bytes per socket read.
    ///
    /// Default: 2048
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size;
        self
    }

    /// Set the largest inbound frame accepted.
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Disable Nagle's algorithm.
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Run dispatches on the given executor instead of a dedicated thread.
    pub fn executor<E: SerialExecutor + 'static>(mut self, executor: Arc<E>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Archive outbound frames here while disconnected.
    pub fn offline_cache<C: OfflineCache + 'static>(mut self, cache: Arc<C>) -> Self {
        self.offline = Some(cache);
        self
    }

    /// Count sent and received frames per command id.
    pub fn stats(mut self, stats: Arc<CommandStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Surface connection loss through `notifier`.
    ///
    /// Default: [`TracingNotifier`]
    pub fn notifier<N: Notifier + 'static>(mut self, notifier: N) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Build a disconnected connection.
    ///
    /// Spawns a dedicated executor thread unless one was supplied.
    pub fn build(self) -> Result<Connection> {
        let executor: Arc<dyn SerialExecutor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(ExecutorThread::spawn(DEFAULT_EXECUTOR_NAME)?),
        };

        Ok(Connection {
            inner: Arc::new(Inner {
                config: self.config,
                executor,
                offline: self.offline,
                stats: self.stats,
                notifier: self.notifier,
                state: Mutex::new(ConnectionState::Disconnected),
                session: Mutex::new(None),
                next_session: AtomicU64::new(1),
                send_lock: Mutex::new(()),
            }),
        })
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A framed TCP connection.
///
/// `Connection` is `Send + Sync`; share it behind an `Arc` to send from
/// several threads. Sends are serialized internally so frames never
/// interleave on the wire. Dropping the connection closes it.
pub struct Connection {
    inner: Arc<Inner>,
}

/// Everything tied to one live socket.
struct Session {
    id: u64,
    stream: Arc<TcpStream>,
    peer: SocketAddr,
    bridge: Arc<DispatchBridge>,
    worker: Option<JoinHandle<()>>,
}

struct Inner {
    config: ConnectionConfig,
    executor: Arc<dyn SerialExecutor>,
    offline: Option<Arc<dyn OfflineCache>>,
    stats: Option<Arc<CommandStats>>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<ConnectionState>,
    session: Mutex<Option<Session>>,
    next_session: AtomicU64,
    send_lock: Mutex<()>,
}

/// Which session a teardown is aimed at.
#[derive(Debug, Clone, Copy)]
enum Target {
    /// Whatever session is live; used by the owner.
    Current,
    /// Only the session with this id. Stale callbacks from an earlier
    /// session must not close its replacement.
    Session(u64),
}

impl Connection {
    /// Create a new connection builder.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Connect to `host:port` and start receiving.
    ///
    /// `host` may be a literal IP address or a name. Every complete inbound
    /// frame is passed to `dispatcher` on the serialized executor.
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` unless the connection is disconnected
    /// - `Resolve` / `Connect` / `Spawn` if the session could not be set up;
    ///   the connection stays disconnected and can be retried
    pub fn connect<D: Dispatcher>(&self, host: &str, port: u16, dispatcher: D) -> Result<()> {
        self.inner.connect(host, port, Box::new(dispatcher))
    }

    /// Is a socket currently live?
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    /// Remote address of the live socket.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        lock(&self.inner.session).as_ref().map(|s| s.peer)
    }

    /// Inbound payloads waiting for the next drain.
    pub fn pending_dispatches(&self) -> usize {
        lock(&self.inner.session)
            .as_ref()
            .map_or(0, |s| s.bridge.pending())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> Option<&Arc<CommandStats>> {
        self.inner.stats.as_ref()
    }

    /// Frame and send one payload.
    ///
    /// While disconnected the framed bytes go to the offline cache (if any)
    /// and this returns `Ok`. While connected the sent counter for the
    /// payload's command id is bumped and the frame is written in full,
    /// blocking the calling thread as long as the socket needs.
    ///
    /// # Errors
    ///
    /// - `FrameTooLarge` if the payload cannot be length-prefixed
    /// - `Send` if the write failed; the connection has been closed
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        let framed = frame(payload)?;

        if !self.is_connected() {
            self.inner.archive(&framed);
            return Ok(());
        }

        if let (Some(stats), Some(command)) = (&self.inner.stats, command_id(payload)) {
            stats.record_sent(command);
        }
        self.inner.write_framed(framed)
    }

    /// Send bytes that are already framed, e.g. a replayed offline cache.
    ///
    /// Diverts to the offline cache untouched while disconnected.
    pub fn send_all(&self, framed: BytesMut) -> Result<()> {
        if !self.is_connected() {
            self.inner.archive(&framed);
            return Ok(());
        }
        self.inner.write_framed(framed)
    }

    /// Close the connection without a warning.
    pub fn close(&self) {
        self.cleanup(false);
    }

    /// Shut the socket down, stop the receiver and drop undispatched frames.
    ///
    /// With `warn` the notifier is told the connection was closed. No-op
    /// unless connected, so repeated calls are harmless.
    pub fn cleanup(&self, warn: bool) {
        self.inner.teardown(Target::Current, CloseReason::Requested, warn);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.inner.teardown(Target::Current, CloseReason::Requested, false);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("peer", &self.peer_addr())
            .finish()
    }
}

impl Inner {
    fn connect(self: &Arc<Self>, host: &str, port: u16, dispatcher: Box<dyn Dispatcher>) -> Result<()> {
        {
            let mut state = lock(&self.state);
            if *state != ConnectionState::Disconnected {
                return Err(TransportError::AlreadyConnected);
            }
            *state = ConnectionState::Connecting;
        }

        let opened = self.open_stream(host, port);
        let (stream, peer) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!(host, port, error = %e, "connect failed");
                *lock(&self.state) = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "failed to clone socket for receiver");
                *lock(&self.state) = ConnectionState::Disconnected;
                return Err(TransportError::Spawn(e));
            }
        };

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let bridge = Arc::new(DispatchBridge::new(
            dispatcher,
            self.executor.clone(),
            self.stats.clone(),
            self.reject_hook(id),
        ));

        // Publish the session before the receiver starts so a receiver that
        // exits immediately finds something to tear down.
        *lock(&self.session) = Some(Session {
            id,
            stream: Arc::new(stream),
            peer,
            bridge: bridge.clone(),
            worker: None,
        });
        *lock(&self.state) = ConnectionState::Connected;

        let worker = ReceiverWorker::new(
            reader,
            self.config.read_chunk_size(),
            self.config.max_frame_size,
            bridge,
        );
        let weak = Arc::downgrade(self);
        let spawned = thread::Builder::new()
            .name(self.config.worker_name.clone())
            .spawn(move || receive(worker, weak, id));

        match spawned {
            Ok(handle) => {
                match lock(&self.session).as_mut() {
                    Some(session) if session.id == id => session.worker = Some(handle),
                    // already torn down; the thread is on its way out
                    _ => drop(handle),
                }
                tracing::debug!(%peer, "connected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%peer, error = %e, "failed to create connection handler");
                self.teardown(Target::Session(id), CloseReason::Requested, false);
                Err(TransportError::Spawn(e))
            }
        }
    }

    fn open_stream(&self, host: &str, port: u16) -> Result<(TcpStream, SocketAddr)> {
        let addr = resolve(host, port)?;

        let stream = match self.config.connect_timeout() {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        }
        .map_err(|source| TransportError::Connect { addr, source })?;

        stream
            .set_read_timeout(Some(self.config.receive_timeout()))
            .map_err(|source| TransportError::Connect { addr, source })?;
        if self.config.nodelay {
            stream
                .set_nodelay(true)
                .map_err(|source| TransportError::Connect { addr, source })?;
        }

        Ok((stream, addr))
    }

    fn reject_hook(self: &Arc<Self>, id: u64) -> Box<dyn Fn() + Send + Sync> {
        let weak = Arc::downgrade(self);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.teardown(Target::Session(id), CloseReason::DispatchRejected, true);
            }
        })
    }

    fn write_framed(&self, mut framed: BytesMut) -> Result<()> {
        let _sending = lock(&self.send_lock);

        let live = lock(&self.session).as_ref().map(|s| (s.id, s.stream.clone()));
        let Some((id, stream)) = live else {
            // closed between the state check and here
            self.archive(&framed);
            return Ok(());
        };

        match write_fully(&mut &*stream, &mut framed) {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, unsent = framed.len(), "failed to send requested data");
                self.teardown(Target::Session(id), CloseReason::SendFailed, false);
                Err(TransportError::Send(e))
            }
        }
    }

    fn archive(&self, framed: &[u8]) {
        let Some(cache) = &self.offline else {
            return;
        };
        tracing::trace!(bytes = framed.len(), "writing to offline cache");
        if let Err(e) = cache.append(framed) {
            tracing::warn!(error = %e, "offline cache append failed");
        }
    }

    /// Close the targeted session. Only the caller that moves the state
    /// from `Connected` to `Closing` does the work; everyone else returns.
    fn teardown(&self, target: Target, reason: CloseReason, warn: bool) {
        {
            let mut state = lock(&self.state);
            if *state != ConnectionState::Connected {
                return;
            }
            if let Target::Session(id) = target {
                let live = lock(&self.session).as_ref().map(|s| s.id);
                if live != Some(id) {
                    tracing::debug!(session = id, %reason, "ignoring teardown of stale session");
                    return;
                }
            }
            *state = ConnectionState::Closing;
        }

        let session = lock(&self.session).take();
        if let Some(mut session) = session {
            let dropped = session.bridge.shutdown();
            let _ = session.stream.shutdown(Shutdown::Both);

            if let Some(worker) = session.worker.take() {
                if worker.thread().id() == thread::current().id() {
                    // teardown from the receiver's own exit path
                    drop(worker);
                } else if worker.join().is_err() {
                    tracing::warn!("receiver thread panicked");
                }
            }
            tracing::debug!(session = session.id, peer = %session.peer, %reason, dropped, "cleanup called");
        }

        *lock(&self.state) = ConnectionState::Disconnected;

        if warn {
            self.notifier.connection_closed(reason);
        }
    }
}

/// Receiver thread body.
fn receive(worker: ReceiverWorker<TcpStream>, inner: Weak<Inner>, id: u64) {
    tracing::debug!(session = id, "receiver started");

    let reason = match worker.run() {
        WorkerExit::Closed => None,
        WorkerExit::PeerClosed => {
            tracing::warn!("socket read failed, connection closed by peer");
            Some(CloseReason::PeerClosed)
        }
        WorkerExit::ReadFailed(e) => {
            tracing::warn!(error = %e, "socket read failed, connection closed");
            Some(CloseReason::ReadFailed)
        }
        WorkerExit::ExecutorClosed => {
            tracing::warn!("dispatch executor refused work, connection closed");
            Some(CloseReason::ExecutorClosed)
        }
    };

    if let (Some(reason), Some(inner)) = (reason, inner.upgrade()) {
        inner.teardown(Target::Session(id), reason, true);
    }
    tracing::debug!(session = id, "receiver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::MemoryCache;

    fn disconnected() -> (Connection, Arc<MemoryCache>, Arc<CommandStats>) {
        let cache = Arc::new(MemoryCache::new());
        let stats = Arc::new(CommandStats::new(16));
        let conn = Connection::builder()
            .executor(Arc::new(crate::dispatch::HostPump::new()))
            .offline_cache(cache.clone())
            .stats(stats.clone())
            .build()
            .unwrap();
        (conn, cache, stats)
    }

    #[test]
    fn test_initial_state() {
        let (conn, _, _) = disconnected();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.is_connected());
        assert_eq!(conn.peer_addr(), None);
        assert_eq!(conn.pending_dispatches(), 0);
    }

    #[test]
    fn test_send_while_disconnected_goes_to_cache() {
        let (conn, cache, stats) = disconnected();

        conn.send(&[0, 0, 0, 7]).unwrap();
        conn.send(b"\x00\x00\x00\x02body").unwrap();

        assert_eq!(
            &cache.take()[..],
            b"\x00\x00\x00\x08\x00\x00\x00\x07\x00\x00\x00\x0c\x00\x00\x00\x02body"
        );
        // sent counters only move for frames that reach the wire
        assert_eq!(stats.snapshot().total_sent(), 0);
    }

    #[test]
    fn test_send_all_while_disconnected_is_verbatim() {
        let (conn, cache, _) = disconnected();
        let framed = frame(b"abc").unwrap();

        conn.send_all(framed.clone()).unwrap();
        assert_eq!(cache.take(), framed);
    }

    #[test]
    fn test_send_without_cache_is_silent() {
        let conn = Connection::builder()
            .executor(Arc::new(crate::dispatch::HostPump::new()))
            .build()
            .unwrap();
        assert!(conn.send(b"dropped").is_ok());
    }

    #[test]
    fn test_cleanup_when_disconnected_is_noop() {
        let notified = Arc::new(Mutex::new(Vec::new()));
        let conn = {
            let notified = notified.clone();
            Connection::builder()
                .executor(Arc::new(crate::dispatch::HostPump::new()))
                .notifier(move |reason: CloseReason| notified.lock().unwrap().push(reason))
                .build()
                .unwrap()
        };

        conn.cleanup(true);
        conn.close();
        assert!(notified.lock().unwrap().is_empty());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_failure_returns_to_disconnected() {
        let (conn, _, _) = disconnected();

        let err = conn
            .connect("no-such-host.invalid", 1, |_p: bytes::Bytes| true)
            .unwrap_err();
        assert!(matches!(err, TransportError::Resolve { .. }));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_refused() {
        // bind then drop to get a port with nothing listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (conn, _, _) = disconnected();

        let err = conn
            .connect("127.0.0.1", port, |_p: bytes::Bytes| true)
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }

    fn recording_notifier() -> (impl Fn(CloseReason) + Send + Sync, Arc<Mutex<Vec<CloseReason>>>) {
        let notified = Arc::new(Mutex::new(Vec::new()));
        let sink = notified.clone();
        (move |reason: CloseReason| sink.lock().unwrap().push(reason), notified)
    }

    fn live_session_id(conn: &Connection) -> u64 {
        lock(&conn.inner.session).as_ref().map(|s| s.id).unwrap()
    }

    #[test]
    fn test_sub_millisecond_timeouts_round_up() {
        let conn = Connection::builder()
            .executor(Arc::new(crate::dispatch::HostPump::new()))
            .receive_timeout(Duration::from_micros(500))
            .connect_timeout(Duration::from_micros(1500))
            .build()
            .unwrap();

        assert_eq!(conn.config().receive_timeout(), Duration::from_millis(1));
        assert_eq!(conn.config().connect_timeout(), Some(Duration::from_millis(2)));
    }

    #[test]
    fn test_stale_session_teardown_ignored() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (notify, notified) = recording_notifier();
        let conn = Connection::builder()
            .executor(Arc::new(crate::dispatch::HostPump::new()))
            .notifier(notify)
            .build()
            .unwrap();

        conn.connect("127.0.0.1", port, |_p: bytes::Bytes| true).unwrap();
        let first = live_session_id(&conn);
        conn.close();

        conn.connect("127.0.0.1", port, |_p: bytes::Bytes| true).unwrap();
        let second = live_session_id(&conn);
        assert_ne!(first, second);

        // late failures from the first session leave the second alone
        conn.inner
            .teardown(Target::Session(first), CloseReason::DispatchRejected, true);
        conn.inner
            .teardown(Target::Session(first), CloseReason::SendFailed, false);
        assert!(conn.is_connected());
        assert!(notified.lock().unwrap().is_empty());

        conn.inner
            .teardown(Target::Session(second), CloseReason::DispatchRejected, true);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(*notified.lock().unwrap(), vec![CloseReason::DispatchRejected]);
    }

    #[test]
    fn test_send_failure_closes_without_warning() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (notify, notified) = recording_notifier();
        let stats = Arc::new(CommandStats::new(16));
        let conn = Connection::builder()
            .executor(Arc::new(crate::dispatch::HostPump::new()))
            .notifier(notify)
            .stats(stats.clone())
            .build()
            .unwrap();

        conn.connect("127.0.0.1", port, |_p: bytes::Bytes| true).unwrap();
        // keep the peer open so the receiver sees no EOF
        let (_peer, _) = listener.accept().unwrap();

        // writes on a socket whose send side is shut down fail hard
        lock(&conn.inner.session)
            .as_ref()
            .unwrap()
            .stream
            .shutdown(Shutdown::Write)
            .unwrap();

        let err = conn.send(&[0, 0, 0, 3]).unwrap_err();
        assert!(matches!(err, TransportError::Send(_)));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(notified.lock().unwrap().is_empty());

        // later sends are archived, not written
        assert!(conn.send(&[0, 0, 0, 3]).is_ok());
        assert_eq!(stats.sent(3), 1);
    }
}
