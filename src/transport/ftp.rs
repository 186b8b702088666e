//! FTP backend (the `ftp` crate)
//!
//! FTP has two gaps compared to SFTP that callers must live with:
//! - listings carry no reliable type information, so every entry other than
//!   `.`/`..` is reported as a folder by `list_subdirectories`;
//! - rename is performed as download → delete → re-upload → delete temp copy.
//!   It is not atomic: a failure after the delete leaves the server without
//!   the file and is reported as `TransportError::PartialRename`.

use super::{
    copy_with_progress, no_progress, remote_basename, remote_io_error, run_blocking, ProgressFn,
    RemoteSide, Transport,
};
use crate::config::Endpoint;
use crate::types::TransportError;
use ::ftp::types::FileType;
use ::ftp::{FtpError, FtpStream};
use async_trait::async_trait;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// FTP transport holding one control connection
pub struct FtpTransport {
    endpoint: Endpoint,
    stream: Arc<Mutex<Option<FtpStream>>>,
}

impl FtpTransport {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            stream: Arc::new(Mutex::new(None)),
        }
    }

    /// Run `f` against the live control connection on the blocking pool
    async fn with_ftp<T, F>(&self, f: F) -> Result<T, TransportError>
    where
        F: FnOnce(&mut FtpStream) -> Result<T, TransportError> + Send + 'static,
        T: Send + 'static,
    {
        let stream = Arc::clone(&self.stream);
        run_blocking(move || {
            let mut guard = stream
                .lock()
                .map_err(|_| TransportError::Connection("FTP connection lock poisoned".into()))?;
            let conn = guard.as_mut().ok_or(TransportError::NotConnected)?;
            f(conn)
        })
        .await
    }
}

fn classify(err: FtpError) -> TransportError {
    match err {
        FtpError::ConnectionError(io) => remote_io_error(io),
        other => TransportError::Protocol(other.to_string()),
    }
}

fn entry_names(raw: Vec<String>) -> Vec<String> {
    raw.iter()
        .map(|entry| remote_basename(entry).to_string())
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .collect()
}

/// Reader wrapper that reports upload progress and remembers local failures
///
/// The `ftp` crate folds read errors into its own connection error, so the
/// local cause is kept here to classify it correctly afterwards.
struct ProgressReader<R> {
    inner: R,
    sent: u64,
    total: u64,
    on_progress: ProgressFn,
    local_error: Option<io::ErrorKind>,
}

impl<R: Read> ProgressReader<R> {
    fn new(inner: R, total: u64, on_progress: ProgressFn) -> Self {
        Self {
            inner,
            sent: 0,
            total,
            on_progress,
            local_error: None,
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.sent += n as u64;
                (self.on_progress)(self.sent, self.total.max(self.sent));
                Ok(n)
            }
            Err(e) => {
                self.local_error = Some(e.kind());
                Err(e)
            }
        }
    }
}

fn retrieve(
    ftp: &mut FtpStream,
    remote: &str,
    target: &Path,
    on_progress: &ProgressFn,
) -> Result<u64, TransportError> {
    let total = ftp.size(remote).ok().flatten().unwrap_or(0) as u64;
    let file = File::create(target)?;

    let outcome = ftp
        .retr(remote, |reader| {
            let mut writer = &file;
            Ok(copy_with_progress(
                reader,
                &mut writer,
                total,
                on_progress,
                RemoteSide::Reader,
            ))
        })
        .map_err(classify)?;

    let copied = outcome?;
    file.sync_all()?;
    Ok(copied)
}

fn store(
    ftp: &mut FtpStream,
    source: &Path,
    remote: &str,
    on_progress: ProgressFn,
) -> Result<u64, TransportError> {
    let total = fs::metadata(source)?.len();
    let mut reader = ProgressReader::new(File::open(source)?, total, on_progress);

    match ftp.put(remote, &mut reader) {
        Ok(()) => Ok(reader.sent),
        Err(err) => match reader.local_error {
            Some(kind) => Err(TransportError::Io(io::Error::new(kind, err.to_string()))),
            None => Err(classify(err)),
        },
    }
}

fn simulated_rename(ftp: &mut FtpStream, from: &str, to: &str) -> Result<(), TransportError> {
    let temp = tempfile::NamedTempFile::new()?;

    // Nothing has changed on the server until the delete succeeds.
    retrieve(ftp, from, temp.path(), &no_progress())?;
    ftp.rm(from).map_err(classify)?;

    if let Err(err) = store(ftp, temp.path(), to, no_progress()) {
        let reason = match temp.keep() {
            Ok((_, kept)) => format!("{} (local copy kept at {})", err, kept.display()),
            Err(keep_err) => format!("{} (local copy lost: {})", err, keep_err),
        };
        return Err(TransportError::PartialRename {
            from: from.to_string(),
            to: to.to_string(),
            stage: "re-upload",
            reason,
        });
    }

    if let Err(err) = temp.close() {
        warn!("Could not remove temporary rename copy: {}", err);
    }
    Ok(())
}

#[async_trait]
impl Transport for FtpTransport {
    fn label(&self) -> &'static str {
        "FTP"
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let endpoint = self.endpoint.clone();
        let stream = Arc::clone(&self.stream);
        run_blocking(move || {
            let mut ftp = FtpStream::connect((endpoint.host.as_str(), endpoint.port)).map_err(
                |e| TransportError::Connection(format!("cannot reach {}: {}", endpoint.address(), e)),
            )?;
            ftp.login(&endpoint.username, &endpoint.secret)
                .map_err(|e| TransportError::Connection(format!("login rejected: {}", e)))?;
            ftp.transfer_type(FileType::Binary).map_err(classify)?;

            let mut guard = stream
                .lock()
                .map_err(|_| TransportError::Connection("FTP connection lock poisoned".into()))?;
            *guard = Some(ftp);
            Ok(())
        })
        .await?;

        info!("Connected to FTP server {}", self.endpoint.address());
        Ok(())
    }

    async fn disconnect(&self) {
        let stream = Arc::clone(&self.stream);
        let closed = run_blocking(move || {
            let taken = match stream.lock() {
                Ok(mut guard) => guard.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            if let Some(mut ftp) = taken {
                let _ = ftp.quit();
                return Ok(true);
            }
            Ok(false)
        })
        .await;

        if let Ok(true) = closed {
            info!("Disconnected from FTP server {}", self.endpoint.address());
        }
    }

    async fn list_entries(&self, path: &str) -> Result<Vec<String>, TransportError> {
        let dir = path.to_string();
        self.with_ftp(move |ftp| Ok(entry_names(ftp.nlst(Some(dir.as_str())).map_err(classify)?)))
            .await
    }

    async fn list_subdirectories(&self, path: &str) -> Result<Vec<String>, TransportError> {
        // No type information in NLST: every non-dot entry counts as a folder.
        self.list_entries(path).await
    }

    async fn stat_size(&self, path: &str) -> Option<u64> {
        let target = path.to_string();
        self.with_ftp(move |ftp| Ok(ftp.size(&target).ok().flatten()))
            .await
            .ok()
            .flatten()
            .map(|size| size as u64)
    }

    async fn exists(&self, path: &str) -> bool {
        let target = path.to_string();
        self.with_ftp(move |ftp| Ok(ftp.size(&target).is_ok()))
            .await
            .unwrap_or(false)
    }

    async fn download(
        &self,
        remote: &str,
        local: &Path,
        on_progress: ProgressFn,
    ) -> Result<u64, TransportError> {
        let source = remote.to_string();
        let target = local.to_path_buf();
        debug!("FTP RETR {} -> {}", remote, local.display());
        self.with_ftp(move |ftp| retrieve(ftp, &source, &target, &on_progress))
            .await
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        on_progress: ProgressFn,
    ) -> Result<u64, TransportError> {
        let source: PathBuf = local.to_path_buf();
        let target = remote.to_string();
        debug!("FTP STOR {} -> {}", local.display(), remote);
        self.with_ftp(move |ftp| store(ftp, &source, &target, on_progress))
            .await
    }

    async fn delete(&self, remote: &str) -> Result<(), TransportError> {
        let target = remote.to_string();
        self.with_ftp(move |ftp| ftp.rm(&target).map_err(classify))
            .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), TransportError> {
        let source = from.to_string();
        let target = to.to_string();
        self.with_ftp(move |ftp| simulated_rename(ftp, &source, &target))
            .await
    }
}
