//! Remote transports
//!
//! Every backend implements [`Transport`]; the session picks one at start-up
//! with [`create`] and never looks at the protocol again. The SFTP and FTP
//! libraries are blocking, so their calls run on tokio's blocking pool behind a
//! mutex that owns the single live connection.

pub mod ftp;
pub mod memory;
pub mod sftp;

use crate::config::Endpoint;
use crate::types::{TransportError, TransportKind};
use async_trait::async_trait;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

pub use self::ftp::FtpTransport;
pub use memory::{MemoryTransport, Operation};
pub use sftp::SftpTransport;

/// Transfer progress callback: `(transferred_bytes, total_bytes)`
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Copy buffer size for streamed transfers
const BUFFER_SIZE: usize = 128 * 1024;

/// A progress callback that ignores updates
pub fn no_progress() -> ProgressFn {
    Arc::new(|_, _| {})
}

/// Uniform operations over a remote file server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Protocol label for log lines
    fn label(&self) -> &'static str;

    /// Open the connection
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the connection; does nothing when not connected
    async fn disconnect(&self);

    /// Names in a remote directory, `.` and `..` excluded
    async fn list_entries(&self, path: &str) -> Result<Vec<String>, TransportError>;

    /// Names of the folders in a remote directory
    async fn list_subdirectories(&self, path: &str) -> Result<Vec<String>, TransportError>;

    /// Size of a remote file, `None` when unavailable
    async fn stat_size(&self, path: &str) -> Option<u64>;

    /// Whether a remote path exists
    async fn exists(&self, path: &str) -> bool;

    /// Download `remote` into `local`, returning the bytes written
    async fn download(
        &self,
        remote: &str,
        local: &Path,
        on_progress: ProgressFn,
    ) -> Result<u64, TransportError>;

    /// Upload `local` to `remote`, returning the bytes sent
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        on_progress: ProgressFn,
    ) -> Result<u64, TransportError>;

    /// Delete a remote file
    async fn delete(&self, remote: &str) -> Result<(), TransportError>;

    /// Rename a remote file
    async fn rename(&self, from: &str, to: &str) -> Result<(), TransportError>;

    /// Observe `(size, exists)` for a remote file
    async fn probe(&self, path: &str) -> (Option<u64>, bool) {
        let size = self.stat_size(path).await;
        let exists = self.exists(path).await;
        (size, exists)
    }
}

/// Build the transport for an endpoint (not yet connected)
pub fn create(endpoint: &Endpoint) -> Arc<dyn Transport> {
    match endpoint.kind {
        TransportKind::Sftp => Arc::new(SftpTransport::new(endpoint.clone())),
        TransportKind::Ftp => Arc::new(FtpTransport::new(endpoint.clone())),
    }
}

/// Join a remote directory and a filename with `/`
pub fn remote_join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Last component of a remote path
pub fn remote_basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Run a blocking protocol call on tokio's blocking pool
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, TransportError>
where
    F: FnOnce() -> Result<T, TransportError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransportError::Connection(format!("transfer worker failed: {}", e)))?
}

/// Which end of a copy is the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoteSide {
    Reader,
    Writer,
}

/// Stream `reader` into `writer`, reporting progress after every chunk
///
/// I/O errors on the remote end are classified as connection or protocol
/// failures; errors on the local end stay `TransportError::Io`.
pub(crate) fn copy_with_progress<R, W>(
    reader: &mut R,
    writer: &mut W,
    total: u64,
    on_progress: &ProgressFn,
    remote: RemoteSide,
) -> Result<u64, TransportError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut copied = 0u64;

    loop {
        let read = reader.read(&mut buffer).map_err(|e| match remote {
            RemoteSide::Reader => remote_io_error(e),
            RemoteSide::Writer => TransportError::Io(e),
        })?;

        if read == 0 {
            break;
        }

        writer.write_all(&buffer[..read]).map_err(|e| match remote {
            RemoteSide::Writer => remote_io_error(e),
            RemoteSide::Reader => TransportError::Io(e),
        })?;

        copied += read as u64;
        on_progress(copied, total.max(copied));
    }

    writer.flush().map_err(|e| match remote {
        RemoteSide::Writer => remote_io_error(e),
        RemoteSide::Reader => TransportError::Io(e),
    })?;

    Ok(copied)
}

/// Classify an I/O error raised by a network stream
pub(crate) fn remote_io_error(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::TimedOut
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::NotConnected => TransportError::Connection(err.to_string()),
        _ => TransportError::Protocol(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    #[test]
    fn test_remote_join() {
        assert_eq!(remote_join("/srv/drop", "a.txt"), "/srv/drop/a.txt");
        assert_eq!(remote_join("/", "a.txt"), "/a.txt");
        assert_eq!(remote_join("/srv/", "a.txt"), "/srv/a.txt");
    }

    #[test]
    fn test_remote_basename() {
        assert_eq!(remote_basename("/srv/drop/a.txt"), "a.txt");
        assert_eq!(remote_basename("a.txt"), "a.txt");
        assert_eq!(remote_basename("/srv/drop/"), "drop");
    }

    #[test]
    fn test_copy_with_progress_reports_every_chunk() {
        let data = vec![7u8; BUFFER_SIZE + 10];
        let mut reader = Cursor::new(data.clone());
        let mut writer = Vec::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let progress: ProgressFn = {
            let seen = Arc::clone(&seen);
            Arc::new(move |done, total| seen.lock().expect("progress lock").push((done, total)))
        };

        let copied = copy_with_progress(
            &mut reader,
            &mut writer,
            data.len() as u64,
            &progress,
            RemoteSide::Reader,
        )
        .expect("copy should succeed");

        assert_eq!(copied, data.len() as u64);
        assert_eq!(writer, data);
        let seen = seen.lock().expect("progress lock");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen.last(), Some(&(data.len() as u64, data.len() as u64)));
    }

    #[test]
    fn test_remote_io_error_classification() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(remote_io_error(reset).is_connection_lost());

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(!remote_io_error(denied).is_connection_lost());
    }
}
