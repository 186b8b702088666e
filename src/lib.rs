//! # mirrorwatch - One-way folder mirroring over SFTP and FTP
//!
//! Keeps a local folder and a remote folder in a one-directional mirror:
//! either the server is polled and changes are downloaded, or the local
//! folder is watched and changes are uploaded. Dropped connections are
//! re-established and the mirror is rebuilt from scratch.

// Module declarations
pub mod commands;
pub mod config;
pub mod diff;
pub mod logging;
pub mod poller;
pub mod session;
pub mod supervisor;
pub mod transport;
pub mod types;
pub mod ui;
pub mod watcher;

// Re-export commonly used types
pub use config::SyncConfig;
pub use session::SessionContext;
pub use transport::Transport;
pub use types::{Direction, FileState, FileStateTable, SyncAction, SyncError, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
