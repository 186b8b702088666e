//! Error types for mirrorwatch

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a transport backend (SFTP, FTP, in-memory)
#[derive(Debug, Error)]
pub enum TransportError {
    /// An operation was attempted without a live connection
    #[error("not connected to remote server")]
    NotConnected,

    /// The session itself failed (socket, handshake, authentication, timeout)
    #[error("connection error: {0}")]
    Connection(String),

    /// The server answered but refused the request (missing file, permissions, ...)
    #[error("server rejected request: {0}")]
    Protocol(String),

    /// Local filesystem error while reading or writing a transfer
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Simulated rename stopped after the original was already removed
    #[error("rename {from} -> {to} stopped after {stage}: {reason}")]
    PartialRename {
        from: String,
        to: String,
        stage: &'static str,
        reason: String,
    },
}

impl TransportError {
    /// Check if the connection is gone and must be re-established
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            TransportError::NotConnected | TransportError::Connection(_)
        )
    }

    /// Check if this is a known protocol limitation (non-atomic FTP rename)
    pub fn is_protocol_limitation(&self) -> bool {
        matches!(self, TransportError::PartialRename { .. })
    }
}

/// Error types for sync sessions
#[derive(Debug, Error)]
pub enum SyncError {
    /// Standard IO error (automatically converted via #[from])
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Initial connect or reconnect failed
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Connection dropped in the middle of a cycle
    #[error("Connection lost: {0}")]
    ConnectionLost(TransportError),

    /// Single file transfer failed
    #[error("Transfer failed for {name}: {source}")]
    Transfer {
        name: String,
        #[source]
        source: TransportError,
    },

    /// Directory enumeration failed
    #[error("Listing failed for {path}: {source}")]
    Listing {
        path: String,
        #[source]
        source: TransportError,
    },

    /// Partial FTP rename, never retried automatically
    #[error("Protocol limitation: {0}")]
    ProtocolLimitation(TransportError),

    /// Local mirror could not be updated
    #[error("Local file error at {path}: {source}")]
    Local {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem watcher could not be started
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl SyncError {
    /// Wrap a transport error raised while handling `name`
    ///
    /// Lost connections and partial renames keep their own variants so the
    /// supervisor can tell them apart from ordinary per-file failures.
    pub fn transfer(name: impl Into<String>, source: TransportError) -> Self {
        if source.is_connection_lost() {
            SyncError::ConnectionLost(source)
        } else if source.is_protocol_limitation() {
            SyncError::ProtocolLimitation(source)
        } else {
            SyncError::Transfer {
                name: name.into(),
                source,
            }
        }
    }

    /// Check if the session must be torn down
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Connection(_) | SyncError::Config(_) | SyncError::Watch(_)
        )
    }

    /// Check if the supervisor should reconnect
    pub fn needs_reconnect(&self) -> bool {
        matches!(self, SyncError::ConnectionLost(_))
    }

    /// Check if this error is recovered by retrying on the next cycle
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::Transfer { .. } | SyncError::Listing { .. } | SyncError::Local { .. }
        )
    }
}
