//! Error types for framewire.

use std::net::SocketAddr;

use thiserror::Error;

/// Main error type for all transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error outside of the connect/send paths.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Host is neither a literal IP address nor a resolvable name.
    #[error("Unable to resolve name: {host}")]
    Resolve { host: String },

    /// TCP connect to a resolved address failed.
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The receiver thread could not be started.
    #[error("Failed to create connection handler: {0}")]
    Spawn(#[source] std::io::Error),

    /// `connect` was called on a connection that is not disconnected.
    #[error("Connection already established")]
    AlreadyConnected,

    /// Non-transient write failure; the connection has been torn down.
    #[error("Failed to send requested data: {0}")]
    Send(#[source] std::io::Error),

    /// Payload does not fit in a 32-bit length prefix.
    #[error("Frame of {size} bytes exceeds the 32-bit length prefix")]
    FrameTooLarge { size: usize },

    /// The serialized executor no longer accepts tasks.
    #[error("Serialized executor is shut down")]
    ExecutorClosed,
}

/// Result type alias using TransportError.
pub type Result<T> = std::result::Result<T, TransportError>;
