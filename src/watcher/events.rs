//! Filesystem notifications → LocalEvent

use crate::types::SyncError;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::warn;

/// Capacity of the notify → reconciler channel
pub const CHANNEL_CAPACITY: usize = 256;

/// A change to a file directly inside the watched folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEvent {
    Created(String),
    Modified(String),
    Removed(String),
    Renamed { from: String, to: String },
}

/// Subscribe to non-recursive notifications on `root`
///
/// Events are delivered on notify's own thread and pushed into a bounded
/// channel; the returned watcher must be kept alive for as long as events
/// are wanted.
pub fn start_notify_watcher(
    root: &Path,
) -> Result<(RecommendedWatcher, mpsc::Receiver<LocalEvent>), SyncError> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let watch_root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let event_root = watch_root.clone();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for local in map_event(&event_root, &event) {
                if tx.blocking_send(local).is_err() {
                    return;
                }
            }
        }
        Err(err) => warn!("File watcher error: {}", err),
    })?;
    watcher.watch(&watch_root, RecursiveMode::NonRecursive)?;
    Ok((watcher, rx))
}

/// Translate one notify event
///
/// Renames reported as a single `Both` event become `Renamed`; the arriving
/// half of a split rename is treated as a modification and the departing
/// half is left to the periodic reconciliation.
pub fn map_event(root: &Path, event: &Event) -> Vec<LocalEvent> {
    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [from, to, ..] = event.paths.as_slice() {
                if let (Some(from), Some(to)) = (to_name(root, from), to_name(root, to)) {
                    return vec![LocalEvent::Renamed { from, to }];
                }
            }
            Vec::new()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Vec::new(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => Vec::new(),
        EventKind::Create(_) => names(root, &event.paths, LocalEvent::Created),
        EventKind::Modify(_) => names(root, &event.paths, LocalEvent::Modified),
        EventKind::Remove(_) => names(root, &event.paths, LocalEvent::Removed),
        _ => Vec::new(),
    }
}

fn names(root: &Path, paths: &[PathBuf], make: fn(String) -> LocalEvent) -> Vec<LocalEvent> {
    paths
        .iter()
        .filter_map(|path| to_name(root, path))
        .map(make)
        .collect()
}

/// Filename of a path directly inside `root`
fn to_name(root: &Path, path: &Path) -> Option<String> {
    if path.parent()? != root {
        return None;
    }
    path.file_name()?.to_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::DataChange;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        Event {
            kind,
            paths: paths.iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_maps_create_and_modify() {
        let root = Path::new("/tmp/root");
        let created = event(EventKind::Create(CreateKind::File), &["/tmp/root/a.txt"]);
        assert_eq!(
            map_event(root, &created),
            vec![LocalEvent::Created("a.txt".into())]
        );

        let modified = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Any)),
            &["/tmp/root/a.txt"],
        );
        assert_eq!(
            map_event(root, &modified),
            vec![LocalEvent::Modified("a.txt".into())]
        );
    }

    #[test]
    fn test_maps_rename_event_to_renamed() {
        let root = Path::new("/tmp/root");
        let renamed = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/tmp/root/a.txt", "/tmp/root/b.txt"],
        );
        assert_eq!(
            map_event(root, &renamed),
            vec![LocalEvent::Renamed {
                from: "a.txt".into(),
                to: "b.txt".into()
            }]
        );
    }

    #[test]
    fn test_split_rename_halves() {
        let root = Path::new("/tmp/root");
        let from = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/tmp/root/a.txt"],
        );
        assert!(map_event(root, &from).is_empty());

        let to = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/tmp/root/b.txt"],
        );
        assert_eq!(map_event(root, &to), vec![LocalEvent::Modified("b.txt".into())]);
    }

    #[test]
    fn test_ignores_nested_paths_and_folders() {
        let root = Path::new("/tmp/root");
        let nested = event(EventKind::Create(CreateKind::File), &["/tmp/root/sub/a.txt"]);
        assert!(map_event(root, &nested).is_empty());

        let folder = event(EventKind::Create(CreateKind::Folder), &["/tmp/root/sub"]);
        assert!(map_event(root, &folder).is_empty());
    }

    #[test]
    fn test_maps_remove() {
        let root = Path::new("/tmp/root");
        let removed = event(EventKind::Remove(RemoveKind::File), &["/tmp/root/a.txt"]);
        assert_eq!(
            map_event(root, &removed),
            vec![LocalEvent::Removed("a.txt".into())]
        );
    }
}
