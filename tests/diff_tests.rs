//! Remote → local reconciliation tests.
//!
//! Each test drives `reconcile_remote` against the in-memory transport and a
//! temporary mirror folder, one cycle at a time.

use mirrorwatch::config::NameFilter;
use mirrorwatch::diff::reconcile_remote;
use mirrorwatch::transport::{MemoryTransport, Operation};
use mirrorwatch::types::{FileStateTable, SyncError};
use mirrorwatch::ui::ProgressReporter;
use std::fs;
use tempfile::TempDir;

struct Mirror {
    dir: TempDir,
    transport: MemoryTransport,
    table: FileStateTable,
    filter: NameFilter,
    reporter: ProgressReporter,
}

impl Mirror {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create mirror tempdir"),
            transport: MemoryTransport::connected(),
            table: FileStateTable::new(),
            filter: NameFilter::default(),
            reporter: ProgressReporter::hidden(),
        }
    }

    async fn cycle(&mut self) -> Result<bool, SyncError> {
        reconcile_remote(
            &self.transport,
            "/r",
            self.dir.path(),
            &mut self.table,
            &self.filter,
            &self.reporter,
        )
        .await
    }

    fn local(&self, name: &str) -> Option<Vec<u8>> {
        fs::read(self.dir.path().join(name)).ok()
    }
}

#[tokio::test]
async fn test_new_remote_file_is_downloaded_and_recorded() {
    let mut mirror = Mirror::new();
    mirror.transport.put_file("/r/a.txt", &[b'a'; 100]);

    let changed = mirror.cycle().await.expect("cycle should succeed");

    assert!(changed);
    assert_eq!(mirror.local("a.txt"), Some(vec![b'a'; 100]));
    let state = mirror.table.get("a.txt").expect("a.txt should be tracked");
    assert_eq!(state.size, Some(100));
    assert!(state.exists);
}

#[tokio::test]
async fn test_remote_deletion_removes_local_mirror() {
    let mut mirror = Mirror::new();
    mirror.transport.put_file("/r/c.txt", &[b'c'; 50]);
    mirror.cycle().await.expect("first cycle");
    assert_eq!(
        mirror.table.get("c.txt").map(|s| (s.size, s.exists)),
        Some((Some(50), true))
    );

    mirror.transport.remove_file("/r/c.txt");
    let changed = mirror.cycle().await.expect("second cycle");

    assert!(changed);
    assert!(mirror.local("c.txt").is_none());
    assert!(!mirror.table.contains("c.txt"));
}

#[tokio::test]
async fn test_unchanged_files_are_not_downloaded_twice() {
    let mut mirror = Mirror::new();
    mirror.transport.put_file("/r/a.txt", b"one");
    mirror.transport.put_file("/r/b.txt", b"two");

    assert!(mirror.cycle().await.expect("first cycle"));
    assert!(!mirror.cycle().await.expect("second cycle"));
    assert!(!mirror.cycle().await.expect("third cycle"));

    assert_eq!(mirror.transport.downloads_of("/r/a.txt"), 1);
    assert_eq!(mirror.transport.downloads_of("/r/b.txt"), 1);
}

#[tokio::test]
async fn test_size_change_triggers_one_redownload() {
    let mut mirror = Mirror::new();
    mirror.transport.put_file("/r/a.txt", b"short");
    mirror.cycle().await.expect("first cycle");

    mirror.transport.put_file("/r/a.txt", b"much longer now");
    assert!(mirror.cycle().await.expect("second cycle"));
    assert!(!mirror.cycle().await.expect("third cycle"));

    assert_eq!(mirror.transport.downloads_of("/r/a.txt"), 2);
    assert_eq!(mirror.local("a.txt"), Some(b"much longer now".to_vec()));
    assert_eq!(mirror.table.get("a.txt").and_then(|s| s.size), Some(15));
}

#[tokio::test]
async fn test_failed_download_is_retried_next_cycle() {
    let mut mirror = Mirror::new();
    mirror.transport.put_file("/r/a.txt", b"payload");
    mirror.transport.fail_transfers_of("/r/a.txt");

    let changed = mirror.cycle().await.expect("per-file failure is not fatal");
    assert!(!changed);
    assert!(!mirror.table.contains("a.txt"));
    assert!(mirror.local("a.txt").is_none());
    assert!(mirror.local("a.txt.part").is_none());

    mirror.transport.clear_transfer_failures();
    assert!(mirror.cycle().await.expect("retry cycle"));
    assert_eq!(mirror.local("a.txt"), Some(b"payload".to_vec()));
    assert_eq!(mirror.transport.downloads_of("/r/a.txt"), 2);
}

#[tokio::test]
async fn test_listing_error_changes_nothing() {
    let mut mirror = Mirror::new();
    mirror.transport.put_file("/r/a.txt", b"keep me");
    mirror.cycle().await.expect("first cycle");

    mirror.transport.fail_next_listings(1);
    let err = mirror.cycle().await.unwrap_err();

    assert!(matches!(err, SyncError::Listing { .. }));
    assert!(err.is_recoverable());
    assert!(mirror.table.contains("a.txt"));
    assert_eq!(mirror.local("a.txt"), Some(b"keep me".to_vec()));
}

#[tokio::test]
async fn test_dropped_connection_is_reported_for_reconnect() {
    let mut mirror = Mirror::new();
    mirror.transport.drop_on_next_listing();

    let err = mirror.cycle().await.unwrap_err();
    assert!(err.needs_reconnect());
}

#[tokio::test]
async fn test_excluded_names_are_never_downloaded() {
    let mut mirror = Mirror::new();
    mirror.filter = NameFilter::new(&["*.tmp".to_string()]).expect("valid glob");
    mirror.transport.put_file("/r/a.txt", b"a");
    mirror.transport.put_file("/r/scratch.tmp", b"t");
    mirror.transport.put_file("/r/logs", b"not really a folder");

    mirror.cycle().await.expect("cycle");

    assert_eq!(mirror.table.names(), vec!["a.txt".to_string()]);
    assert_eq!(
        mirror
            .transport
            .count(|op| matches!(op, Operation::Download(_))),
        1
    );
}

#[tokio::test]
async fn test_remote_folder_entry_is_retried_without_tracking() {
    let mut mirror = Mirror::new();
    mirror.transport.add_dir("/r/sub");

    let changed = mirror.cycle().await.expect("cycle");

    assert!(!changed);
    assert!(!mirror.table.contains("sub"));
    assert_eq!(mirror.transport.downloads_of("/r/sub"), 1);
}

#[tokio::test]
async fn test_remote_part_file_survives_download_of_its_base_name() {
    let mut mirror = Mirror::new();
    mirror.transport.put_file("/r/big.iso.part", b"half");
    mirror.cycle().await.expect("first cycle");

    mirror.transport.put_file("/r/big.iso", b"whole image");
    mirror.cycle().await.expect("second cycle");
    assert!(!mirror.cycle().await.expect("third cycle"));

    assert_eq!(mirror.local("big.iso.part"), Some(b"half".to_vec()));
    assert_eq!(mirror.local("big.iso"), Some(b"whole image".to_vec()));
    assert!(mirror.table.contains("big.iso.part"));
    assert_eq!(mirror.transport.downloads_of("/r/big.iso.part"), 1);

    let mut entries: Vec<String> = fs::read_dir(mirror.dir.path())
        .expect("read mirror")
        .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["big.iso".to_string(), "big.iso.part".to_string()]);
}
