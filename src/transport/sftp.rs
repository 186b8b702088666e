//! SFTP backend (libssh2 via the `ssh2` crate)

use super::{copy_with_progress, run_blocking, ProgressFn, RemoteSide, Transport};
use crate::config::Endpoint;
use crate::types::TransportError;
use async_trait::async_trait;
use ssh2::{ErrorCode, Session, Sftp};
use std::fs::{self, File};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Blocking-call timeout applied to the SSH session
const SESSION_TIMEOUT_MS: u32 = 30_000;

struct SftpHandle {
    session: Session,
    sftp: Sftp,
}

/// SFTP transport holding one SSH session
pub struct SftpTransport {
    endpoint: Endpoint,
    handle: Arc<Mutex<Option<SftpHandle>>>,
}

impl SftpTransport {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Run `f` against the live SFTP channel on the blocking pool
    async fn with_sftp<T, F>(&self, f: F) -> Result<T, TransportError>
    where
        F: FnOnce(&Sftp) -> Result<T, TransportError> + Send + 'static,
        T: Send + 'static,
    {
        let handle = Arc::clone(&self.handle);
        run_blocking(move || {
            let guard = handle
                .lock()
                .map_err(|_| TransportError::Connection("SFTP session lock poisoned".into()))?;
            let conn = guard.as_ref().ok_or(TransportError::NotConnected)?;
            f(&conn.sftp)
        })
        .await
    }
}

fn open_session(endpoint: &Endpoint) -> Result<SftpHandle, TransportError> {
    let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).map_err(|e| {
        TransportError::Connection(format!("cannot reach {}: {}", endpoint.address(), e))
    })?;

    let mut session = Session::new().map_err(session_error)?;
    session.set_tcp_stream(tcp);
    session.set_timeout(SESSION_TIMEOUT_MS);
    session.handshake().map_err(session_error)?;
    session
        .userauth_password(&endpoint.username, &endpoint.secret)
        .map_err(session_error)?;

    if !session.authenticated() {
        return Err(TransportError::Connection(format!(
            "authentication rejected for {}",
            endpoint.username
        )));
    }

    let sftp = session.sftp().map_err(session_error)?;
    Ok(SftpHandle { session, sftp })
}

/// Session-level libssh2 codes mean the connection is unusable;
/// SFTP status codes are per-request refusals.
fn classify(err: ssh2::Error) -> TransportError {
    match err.code() {
        ErrorCode::SFTP(_) => TransportError::Protocol(err.to_string()),
        ErrorCode::Session(_) => TransportError::Connection(err.to_string()),
    }
}

fn session_error(err: ssh2::Error) -> TransportError {
    TransportError::Connection(err.to_string())
}

fn entry_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

#[async_trait]
impl Transport for SftpTransport {
    fn label(&self) -> &'static str {
        "SFTP"
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let endpoint = self.endpoint.clone();
        let handle = Arc::clone(&self.handle);
        run_blocking(move || {
            let conn = open_session(&endpoint)?;
            let mut guard = handle
                .lock()
                .map_err(|_| TransportError::Connection("SFTP session lock poisoned".into()))?;
            *guard = Some(conn);
            Ok(())
        })
        .await?;

        info!("Connected to SFTP server {}", self.endpoint.address());
        Ok(())
    }

    async fn disconnect(&self) {
        let handle = Arc::clone(&self.handle);
        let closed = run_blocking(move || {
            let taken = match handle.lock() {
                Ok(mut guard) => guard.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            if let Some(conn) = taken {
                drop(conn.sftp);
                let _ = conn.session.disconnect(None, "closing", None);
                return Ok(true);
            }
            Ok(false)
        })
        .await;

        if let Ok(true) = closed {
            info!("Disconnected from SFTP server {}", self.endpoint.address());
        }
    }

    async fn list_entries(&self, path: &str) -> Result<Vec<String>, TransportError> {
        let dir = PathBuf::from(path);
        self.with_sftp(move |sftp| {
            let entries = sftp.readdir(&dir).map_err(classify)?;
            Ok(entries
                .iter()
                .filter_map(|(entry, _)| entry_name(entry))
                .collect())
        })
        .await
    }

    async fn list_subdirectories(&self, path: &str) -> Result<Vec<String>, TransportError> {
        let dir = PathBuf::from(path);
        self.with_sftp(move |sftp| {
            let entries = sftp.readdir(&dir).map_err(classify)?;
            Ok(entries
                .iter()
                .filter(|(_, stat)| stat.is_dir())
                .filter_map(|(entry, _)| entry_name(entry))
                .collect())
        })
        .await
    }

    async fn stat_size(&self, path: &str) -> Option<u64> {
        let target = PathBuf::from(path);
        self.with_sftp(move |sftp| Ok(sftp.stat(&target).map_err(classify)?.size))
            .await
            .ok()
            .flatten()
    }

    async fn exists(&self, path: &str) -> bool {
        let target = PathBuf::from(path);
        self.with_sftp(move |sftp| Ok(sftp.stat(&target).is_ok()))
            .await
            .unwrap_or(false)
    }

    async fn download(
        &self,
        remote: &str,
        local: &Path,
        on_progress: ProgressFn,
    ) -> Result<u64, TransportError> {
        let source = PathBuf::from(remote);
        let target = local.to_path_buf();
        debug!("SFTP get {} -> {}", remote, local.display());

        self.with_sftp(move |sftp| {
            let total = sftp.stat(&source).map_err(classify)?.size.unwrap_or(0);
            let mut reader = sftp.open(&source).map_err(classify)?;
            let mut writer = File::create(&target)?;
            let copied = copy_with_progress(
                &mut reader,
                &mut writer,
                total,
                &on_progress,
                RemoteSide::Reader,
            )?;
            writer.sync_all()?;
            Ok(copied)
        })
        .await
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        on_progress: ProgressFn,
    ) -> Result<u64, TransportError> {
        let source = local.to_path_buf();
        let target = PathBuf::from(remote);
        debug!("SFTP put {} -> {}", local.display(), remote);

        self.with_sftp(move |sftp| {
            let total = fs::metadata(&source)?.len();
            let mut reader = File::open(&source)?;
            let mut writer = sftp.create(&target).map_err(classify)?;
            copy_with_progress(
                &mut reader,
                &mut writer,
                total,
                &on_progress,
                RemoteSide::Writer,
            )
        })
        .await
    }

    async fn delete(&self, remote: &str) -> Result<(), TransportError> {
        let target = PathBuf::from(remote);
        self.with_sftp(move |sftp| sftp.unlink(&target).map_err(classify))
            .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), TransportError> {
        let source = PathBuf::from(from);
        let target = PathBuf::from(to);
        self.with_sftp(move |sftp| sftp.rename(&source, &target, None).map_err(classify))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransportKind;

    fn endpoint() -> Endpoint {
        Endpoint {
            kind: TransportKind::Sftp,
            host: "127.0.0.1".to_string(),
            port: 1,
            username: "nobody".to_string(),
            secret: "nothing".to_string(),
        }
    }

    #[test]
    fn test_entry_name_skips_dot_entries() {
        assert_eq!(entry_name(Path::new("/srv/a.txt")), Some("a.txt".to_string()));
        assert_eq!(entry_name(Path::new("..")), None);
        assert_eq!(entry_name(Path::new(".")), None);
    }

    #[tokio::test]
    async fn test_operations_without_connection_report_not_connected() {
        let transport = SftpTransport::new(endpoint());

        let err = transport.list_entries("/").await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
        assert_eq!(transport.stat_size("/a.txt").await, None);
        assert!(!transport.exists("/a.txt").await);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let transport = SftpTransport::new(endpoint());
        transport.disconnect().await;
        transport.disconnect().await;
    }
}
