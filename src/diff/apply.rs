//! Plan execution against the local mirror

use crate::diff::DiffPlan;
use crate::transport::{remote_join, Transport};
use crate::types::{FileStateTable, SyncAction, SyncError};
use crate::ui::ProgressReporter;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{error, info};

/// Outcome counters for one executed plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Number of actions in the input plan
    pub total_actions: usize,
    /// Actions that changed the table
    pub completed_actions: usize,
    /// Actions that failed and will be retried next cycle
    pub failed_actions: usize,
    pub bytes_downloaded: u64,
}

impl ExecutionStats {
    /// Check if any table entry was inserted, replaced, or removed
    pub fn changed(&self) -> bool {
        self.completed_actions > 0
    }
}

/// Where a plan is applied
pub struct MirrorTarget<'a> {
    pub transport: &'a dyn Transport,
    pub remote_dir: &'a str,
    pub local_dir: &'a Path,
}

/// Execute a plan, updating the table after each successful action
///
/// Per-file failures are logged and skipped so the file stays untracked and
/// is picked up again next cycle. A lost connection aborts the plan and is
/// returned to the caller.
pub async fn execute_plan(
    plan: &DiffPlan,
    target: &MirrorTarget<'_>,
    table: &mut FileStateTable,
    reporter: &ProgressReporter,
) -> Result<ExecutionStats, SyncError> {
    let mut stats = ExecutionStats {
        total_actions: plan.actions.len(),
        ..Default::default()
    };

    for action in &plan.actions {
        match action {
            SyncAction::Download { name, size, exists }
            | SyncAction::Redownload { name, size, exists } => {
                info!("{}: {}", action.action_name(), name);
                match download_atomic(target, name, action.action_name(), reporter).await {
                    Ok(bytes) => {
                        table.record(name.as_str(), *size, *exists);
                        stats.completed_actions += 1;
                        stats.bytes_downloaded += bytes;
                        info!("Downloaded {} ({} bytes)", name, bytes);
                    }
                    Err(err) if err.needs_reconnect() => return Err(err),
                    Err(err) => {
                        stats.failed_actions += 1;
                        error!("{}", err);
                    }
                }
            }
            SyncAction::DeleteLocal(name) => {
                info!("{}: {}", action.action_name(), name);
                if let Err(err) = remove_local(&target.local_dir.join(name)) {
                    error!("{}", err);
                }
                table.remove(name);
                stats.completed_actions += 1;
            }
            SyncAction::Skip => {}
        }
    }

    Ok(stats)
}

/// Suffix of the temporary file a download is written to
pub const PART_SUFFIX: &str = ".part";

/// Reserve a uniquely named temporary file next to the mirror
///
/// The random name cannot shadow a mirrored file; the file is deleted when
/// the handle drops unless it has been persisted.
pub fn part_file(local_dir: &Path) -> io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(".mirrorwatch-")
        .suffix(PART_SUFFIX)
        .tempfile_in(local_dir)
}

async fn download_atomic(
    target: &MirrorTarget<'_>,
    name: &str,
    action: &str,
    reporter: &ProgressReporter,
) -> Result<u64, SyncError> {
    let remote = remote_join(target.remote_dir, name);
    let dest = target.local_dir.join(name);
    let part = part_file(target.local_dir).map_err(|source| SyncError::Local {
        path: target.local_dir.to_path_buf(),
        source,
    })?;

    let bar = reporter.start_transfer(action, name);
    let bytes = match target.transport.download(&remote, part.path(), bar.callback()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            reporter.abandon_transfer(bar);
            return Err(SyncError::transfer(name, err));
        }
    };

    if let Err(err) = part.persist(&dest) {
        reporter.abandon_transfer(bar);
        return Err(SyncError::Local {
            path: dest,
            source: err.error,
        });
    }

    reporter.complete_transfer(bar, bytes);
    Ok(bytes)
}

fn remove_local(path: &Path) -> Result<(), SyncError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SyncError::Local {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{plan_remote_changes, RemoteObservation};
    use crate::transport::MemoryTransport;
    use tempfile::TempDir;

    #[test]
    fn test_part_files_are_unique_and_cleaned_up() {
        let dir = TempDir::new().expect("create tempdir");
        let first = part_file(dir.path()).expect("first part file");
        let second = part_file(dir.path()).expect("second part file");

        assert_ne!(first.path(), second.path());
        assert_eq!(first.path().parent(), Some(dir.path()));
        let name = first.path().file_name().and_then(|n| n.to_str()).expect("utf-8 name");
        assert!(name.ends_with(PART_SUFFIX));

        let path = first.path().to_path_buf();
        drop(first);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_part_file_and_no_entry() {
        let dir = TempDir::new().expect("create tempdir");
        let transport = MemoryTransport::connected();
        transport.put_file("/r/a.txt", b"data");
        transport.fail_transfers_of("/r/a.txt");

        let mut table = FileStateTable::new();
        let plan = plan_remote_changes(&[RemoteObservation::new("a.txt", Some(4), true)], &table);
        let target = MirrorTarget {
            transport: &transport,
            remote_dir: "/r",
            local_dir: dir.path(),
        };

        let stats = execute_plan(&plan, &target, &mut table, &ProgressReporter::hidden())
            .await
            .expect("per-file failure is not fatal");

        assert_eq!(stats.failed_actions, 1);
        assert!(!stats.changed());
        assert!(table.is_empty());
        assert!(!dir.path().join("a.txt").exists());
        assert_eq!(fs::read_dir(dir.path()).expect("read mirror").count(), 0);
    }

    #[tokio::test]
    async fn test_lost_connection_aborts_plan() {
        let dir = TempDir::new().expect("create tempdir");
        let transport = MemoryTransport::new();
        let mut table = FileStateTable::new();
        let plan = plan_remote_changes(&[RemoteObservation::new("a.txt", Some(4), true)], &table);
        let target = MirrorTarget {
            transport: &transport,
            remote_dir: "/r",
            local_dir: dir.path(),
        };

        let err = execute_plan(&plan, &target, &mut table, &ProgressReporter::hidden())
            .await
            .unwrap_err();
        assert!(err.needs_reconnect());
    }

    #[tokio::test]
    async fn test_delete_of_missing_local_file_still_untracks() {
        let dir = TempDir::new().expect("create tempdir");
        let transport = MemoryTransport::connected();
        let mut table = FileStateTable::new();
        table.record("gone.txt", Some(3), true);

        let plan = plan_remote_changes(&[], &table);
        let target = MirrorTarget {
            transport: &transport,
            remote_dir: "/r",
            local_dir: dir.path(),
        };
        let stats = execute_plan(&plan, &target, &mut table, &ProgressReporter::hidden())
            .await
            .expect("delete should succeed");

        assert!(stats.changed());
        assert!(table.is_empty());
    }
}
