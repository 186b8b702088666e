//! Core type definitions for mirrorwatch

mod action;
mod error;
mod state;

pub use action::{Direction, SyncAction, TransportKind};
pub use error::{SyncError, TransportError};
pub use state::{FileState, FileStateTable};
