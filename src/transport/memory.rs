//! In-memory transport
//!
//! Holds remote files in a map and records every operation, so the engine can
//! be exercised end-to-end without a server. Failures can be injected per
//! file, per listing, or for the whole connection.

use super::{remote_basename, ProgressFn, Transport};
use crate::types::TransportError;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// One recorded transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Disconnect,
    List(String),
    Download(String),
    Upload(String),
    Delete(String),
    Rename(String, String),
}

#[derive(Debug, Default)]
struct MemoryState {
    connected: bool,
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    failing_transfers: HashSet<String>,
    failing_listings: u32,
    drops_pending: u32,
    refused_connects: u32,
    log: Vec<Operation>,
}

/// Remote file server kept in memory
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "",
    }
}

impl MemoryTransport {
    /// Create a disconnected transport with no files
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that is already connected
    pub fn connected() -> Self {
        let transport = Self::new();
        transport.lock().connected = true;
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Place a file on the "server"
    pub fn put_file(&self, path: &str, contents: &[u8]) {
        self.lock().files.insert(path.to_string(), contents.to_vec());
    }

    /// Remove a file from the "server"
    pub fn remove_file(&self, path: &str) {
        self.lock().files.remove(path);
    }

    /// Contents of a remote file
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    /// Create a remote folder
    pub fn add_dir(&self, path: &str) {
        self.lock().dirs.insert(path.to_string());
    }

    /// Make every download/upload touching `path` fail until cleared
    pub fn fail_transfers_of(&self, path: &str) {
        self.lock().failing_transfers.insert(path.to_string());
    }

    /// Stop injecting per-file transfer failures
    pub fn clear_transfer_failures(&self) {
        self.lock().failing_transfers.clear();
    }

    /// Make the next `count` listings fail with a protocol error
    pub fn fail_next_listings(&self, count: u32) {
        self.lock().failing_listings = count;
    }

    /// Drop the connection on the next listing
    pub fn drop_on_next_listing(&self) {
        self.lock().drops_pending = 1;
    }

    /// Drop the connection now
    pub fn drop_connection(&self) {
        self.lock().connected = false;
    }

    /// Refuse the next `count` connection attempts
    pub fn refuse_connections(&self, count: u32) {
        self.lock().refused_connects = count;
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Every call made so far, oldest first
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().log.clone()
    }

    /// Number of recorded calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&Operation) -> bool) -> usize {
        self.lock().log.iter().filter(|op| predicate(op)).count()
    }

    /// Number of downloads of a remote path
    pub fn downloads_of(&self, path: &str) -> usize {
        self.count(|op| matches!(op, Operation::Download(p) if p == path))
    }

    /// Number of uploads to a remote path
    pub fn uploads_of(&self, path: &str) -> usize {
        self.count(|op| matches!(op, Operation::Upload(p) if p == path))
    }

    fn ensure_connected(state: &MemoryState) -> Result<(), TransportError> {
        if state.connected {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn label(&self) -> &'static str {
        "MEMORY"
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.log.push(Operation::Connect);
        if state.refused_connects > 0 {
            state.refused_connects -= 1;
            return Err(TransportError::Connection("connection refused".into()));
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.lock();
        state.log.push(Operation::Disconnect);
        state.connected = false;
    }

    async fn list_entries(&self, path: &str) -> Result<Vec<String>, TransportError> {
        let mut state = self.lock();
        state.log.push(Operation::List(path.to_string()));
        if state.drops_pending > 0 {
            state.drops_pending -= 1;
            state.connected = false;
            return Err(TransportError::Connection("connection reset by peer".into()));
        }
        Self::ensure_connected(&state)?;
        if state.failing_listings > 0 {
            state.failing_listings -= 1;
            return Err(TransportError::Protocol("550 listing refused".into()));
        }

        let dir = path.trim_end_matches('/');
        let dir = if dir.is_empty() { "/" } else { dir };
        Ok(state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter(|p| parent_of(p) == dir)
            .map(|p| remote_basename(p).to_string())
            .collect())
    }

    async fn list_subdirectories(&self, path: &str) -> Result<Vec<String>, TransportError> {
        let state = self.lock();
        Self::ensure_connected(&state)?;
        let dir = path.trim_end_matches('/');
        let dir = if dir.is_empty() { "/" } else { dir };
        Ok(state
            .dirs
            .iter()
            .filter(|p| parent_of(p) == dir)
            .map(|p| remote_basename(p).to_string())
            .collect())
    }

    async fn stat_size(&self, path: &str) -> Option<u64> {
        let state = self.lock();
        if !state.connected {
            return None;
        }
        state.files.get(path).map(|data| data.len() as u64)
    }

    async fn exists(&self, path: &str) -> bool {
        let state = self.lock();
        state.connected && (state.files.contains_key(path) || state.dirs.contains(path))
    }

    async fn download(
        &self,
        remote: &str,
        local: &Path,
        on_progress: ProgressFn,
    ) -> Result<u64, TransportError> {
        let data = {
            let mut state = self.lock();
            state.log.push(Operation::Download(remote.to_string()));
            Self::ensure_connected(&state)?;
            if state.failing_transfers.contains(remote) {
                return Err(TransportError::Protocol(format!("550 {}: transfer refused", remote)));
            }
            state
                .files
                .get(remote)
                .cloned()
                .ok_or_else(|| TransportError::Protocol(format!("550 {}: no such file", remote)))?
        };

        fs::write(local, &data)?;
        let size = data.len() as u64;
        on_progress(size, size);
        Ok(size)
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        on_progress: ProgressFn,
    ) -> Result<u64, TransportError> {
        let data = fs::read(local)?;
        let mut state = self.lock();
        state.log.push(Operation::Upload(remote.to_string()));
        Self::ensure_connected(&state)?;
        if state.failing_transfers.contains(remote) {
            return Err(TransportError::Protocol(format!("550 {}: transfer refused", remote)));
        }

        let size = data.len() as u64;
        state.files.insert(remote.to_string(), data);
        on_progress(size, size);
        Ok(size)
    }

    async fn delete(&self, remote: &str) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.log.push(Operation::Delete(remote.to_string()));
        Self::ensure_connected(&state)?;
        state
            .files
            .remove(remote)
            .map(|_| ())
            .ok_or_else(|| TransportError::Protocol(format!("550 {}: no such file", remote)))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), TransportError> {
        let mut state = self.lock();
        state
            .log
            .push(Operation::Rename(from.to_string(), to.to_string()));
        Self::ensure_connected(&state)?;
        let data = state
            .files
            .remove(from)
            .ok_or_else(|| TransportError::Protocol(format!("550 {}: no such file", from)))?;
        state.files.insert(to.to_string(), data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::no_progress;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_listing_is_one_level() {
        let transport = MemoryTransport::connected();
        transport.put_file("/r/a.txt", b"a");
        transport.put_file("/r/sub/b.txt", b"b");
        transport.add_dir("/r/sub");

        let mut names = transport.list_entries("/r").await.expect("listing");
        names.sort();
        assert_eq!(names, vec!["a.txt".to_string(), "sub".to_string()]);
        assert_eq!(
            transport.list_subdirectories("/r/").await.expect("listing"),
            vec!["sub".to_string()]
        );
    }

    #[tokio::test]
    async fn test_disconnected_operations_fail() {
        let transport = MemoryTransport::new();
        transport.put_file("/r/a.txt", b"a");

        assert!(matches!(
            transport.list_entries("/r").await,
            Err(TransportError::NotConnected)
        ));
        assert_eq!(transport.stat_size("/r/a.txt").await, None);
    }

    #[tokio::test]
    async fn test_round_trip_through_local_file() {
        let dir = TempDir::new().expect("create tempdir");
        let local = dir.path().join("a.txt");
        let transport = MemoryTransport::connected();
        transport.put_file("/r/a.txt", b"hello");

        let size = transport
            .download("/r/a.txt", &local, no_progress())
            .await
            .expect("download");
        assert_eq!(size, 5);

        transport
            .upload(&local, "/r/copy.txt", no_progress())
            .await
            .expect("upload");
        assert_eq!(transport.file("/r/copy.txt"), Some(b"hello".to_vec()));
        assert_eq!(transport.downloads_of("/r/a.txt"), 1);
        assert_eq!(transport.uploads_of("/r/copy.txt"), 1);
    }

    #[tokio::test]
    async fn test_refused_connections_count_down() {
        let transport = MemoryTransport::new();
        transport.refuse_connections(1);

        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_ok());
        assert!(transport.is_connected());
    }
}
