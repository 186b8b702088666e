//! Local → remote reconciliation
//!
//! Used for the initial upload and as the periodic safety net behind the
//! event path: every regular file in the local folder is compared with the
//! table of uploaded files.

use crate::config::NameFilter;
use crate::diff::compare_state;
use crate::transport::{remote_join, Transport};
use crate::types::{FileStateTable, SyncError};
use crate::ui::ProgressReporter;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

/// Where uploads go
pub struct UploadTarget<'a> {
    pub transport: &'a dyn Transport,
    pub local_dir: &'a Path,
    pub remote_dir: &'a str,
}

/// Counters for one local reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalReconcileStats {
    pub uploaded: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl LocalReconcileStats {
    pub fn changed(&self) -> bool {
        self.uploaded > 0 || self.deleted > 0
    }
}

/// Regular files directly inside `dir`, with their sizes
pub fn scan_local_files(
    dir: &Path,
    filter: &NameFilter,
) -> Result<BTreeMap<String, u64>, SyncError> {
    let local_error = |source| SyncError::Local {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = BTreeMap::new();
    for entry in fs::read_dir(dir).map_err(local_error)? {
        let entry = entry.map_err(local_error)?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            debug!("Skipping non UTF-8 name {:?}", entry.file_name());
            continue;
        };
        if filter.is_excluded(&name) {
            continue;
        }
        match fs::metadata(entry.path()) {
            Ok(meta) if meta.is_file() => {
                files.insert(name, meta.len());
            }
            Ok(_) => {}
            Err(err) => debug!("Skipping {}: {}", name, err),
        }
    }
    Ok(files)
}

/// Upload one local file and record it on success
///
/// Returns `Ok(false)` when the file is no longer a regular file by the time
/// the upload would start.
pub async fn upload_file(
    target: &UploadTarget<'_>,
    name: &str,
    table: &mut FileStateTable,
    reporter: &ProgressReporter,
) -> Result<bool, SyncError> {
    let local = target.local_dir.join(name);
    let size = match fs::metadata(&local) {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => {
            debug!("{} is gone, nothing to upload", name);
            return Ok(false);
        }
    };

    let remote = remote_join(target.remote_dir, name);
    let bar = reporter.start_transfer("Upload", name);
    match target.transport.upload(&local, &remote, bar.callback()).await {
        Ok(bytes) => {
            reporter.complete_transfer(bar, bytes);
            table.record(name, Some(size), true);
            info!("Uploaded {} ({} bytes)", name, bytes);
            Ok(true)
        }
        Err(err) => {
            reporter.abandon_transfer(bar);
            Err(SyncError::transfer(name, err))
        }
    }
}

/// Delete the remote copy of a file and stop tracking it
pub async fn delete_remote(
    target: &UploadTarget<'_>,
    name: &str,
    table: &mut FileStateTable,
) -> Result<(), SyncError> {
    let remote = remote_join(target.remote_dir, name);
    let result = target.transport.delete(&remote).await;
    match result {
        Ok(()) => {
            table.remove(name);
            info!("Deleted remote {}", remote);
            Ok(())
        }
        Err(err) => {
            let err = SyncError::transfer(name, err);
            if !err.needs_reconnect() {
                table.remove(name);
            }
            Err(err)
        }
    }
}

/// Bring the remote folder in line with the local one
///
/// New or resized local files are uploaded; tracked files that vanished
/// locally are deleted remotely. Per-file failures are logged and counted; a
/// lost connection is returned immediately.
pub async fn reconcile_local(
    target: &UploadTarget<'_>,
    table: &mut FileStateTable,
    filter: &NameFilter,
    reporter: &ProgressReporter,
) -> Result<LocalReconcileStats, SyncError> {
    let local = scan_local_files(target.local_dir, filter)?;
    let mut stats = LocalReconcileStats::default();

    for (name, size) in &local {
        let action = compare_state(table.get(name), name, Some(*size), true);
        if action.is_skip() {
            continue;
        }
        info!("{}: {}", action.action_name(), name);
        match upload_file(target, name, table, reporter).await {
            Ok(true) => stats.uploaded += 1,
            Ok(false) => {}
            Err(err) if err.needs_reconnect() => return Err(err),
            Err(err) => {
                stats.failed += 1;
                error!("{}", err);
            }
        }
    }

    for name in table.names() {
        if local.contains_key(&name) {
            continue;
        }
        info!("FILE REMOVED: {}", name);
        match delete_remote(target, &name, table).await {
            Ok(()) => stats.deleted += 1,
            Err(err) if err.needs_reconnect() => return Err(err),
            Err(err) => {
                stats.failed += 1;
                error!("{}", err);
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use tempfile::TempDir;

    #[test]
    fn test_scan_skips_folders_and_excluded_names() {
        let dir = TempDir::new().expect("create tempdir");
        fs::write(dir.path().join("a.txt"), b"abc").expect("write a.txt");
        fs::write(dir.path().join("skip.tmp"), b"x").expect("write skip.tmp");
        fs::create_dir(dir.path().join("logs")).expect("create logs");
        fs::create_dir(dir.path().join("sub")).expect("create sub");

        let filter = NameFilter::new(&["*.tmp".to_string()]).expect("valid glob");
        let files = scan_local_files(dir.path(), &filter).expect("scan");

        assert_eq!(files.len(), 1);
        assert_eq!(files.get("a.txt"), Some(&3));
    }

    #[tokio::test]
    async fn test_reconcile_uploads_then_settles() {
        let dir = TempDir::new().expect("create tempdir");
        fs::write(dir.path().join("a.txt"), b"abc").expect("write a.txt");
        let transport = MemoryTransport::connected();
        let target = UploadTarget {
            transport: &transport,
            local_dir: dir.path(),
            remote_dir: "/r",
        };
        let mut table = FileStateTable::new();
        let reporter = ProgressReporter::hidden();

        let first = reconcile_local(&target, &mut table, &NameFilter::default(), &reporter)
            .await
            .expect("reconcile");
        assert_eq!(first.uploaded, 1);
        assert_eq!(transport.file("/r/a.txt"), Some(b"abc".to_vec()));

        let second = reconcile_local(&target, &mut table, &NameFilter::default(), &reporter)
            .await
            .expect("reconcile");
        assert!(!second.changed());
        assert_eq!(transport.uploads_of("/r/a.txt"), 1);
    }

    #[tokio::test]
    async fn test_reconcile_deletes_vanished_files() {
        let dir = TempDir::new().expect("create tempdir");
        let transport = MemoryTransport::connected();
        transport.put_file("/r/old.txt", b"old");
        let target = UploadTarget {
            transport: &transport,
            local_dir: dir.path(),
            remote_dir: "/r",
        };
        let mut table = FileStateTable::new();
        table.record("old.txt", Some(3), true);

        let stats = reconcile_local(
            &target,
            &mut table,
            &NameFilter::default(),
            &ProgressReporter::hidden(),
        )
        .await
        .expect("reconcile");

        assert_eq!(stats.deleted, 1);
        assert!(table.is_empty());
        assert!(transport.file("/r/old.txt").is_none());
    }

    #[tokio::test]
    async fn test_failed_upload_stays_untracked() {
        let dir = TempDir::new().expect("create tempdir");
        fs::write(dir.path().join("a.txt"), b"abc").expect("write a.txt");
        let transport = MemoryTransport::connected();
        transport.fail_transfers_of("/r/a.txt");
        let target = UploadTarget {
            transport: &transport,
            local_dir: dir.path(),
            remote_dir: "/r",
        };
        let mut table = FileStateTable::new();

        let stats = reconcile_local(
            &target,
            &mut table,
            &NameFilter::default(),
            &ProgressReporter::hidden(),
        )
        .await
        .expect("per-file failure is not fatal");

        assert_eq!(stats.failed, 1);
        assert!(!table.contains("a.txt"));
    }
}
