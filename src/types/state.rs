//! FileStateTable - Last observed state of every mirrored file

use chrono::{DateTime, Local};
use std::collections::HashMap;

/// Last observed state of a single file
#[derive(Debug, Clone, PartialEq)]
pub struct FileState {
    /// Size in bytes, `None` when the server could not report it
    pub size: Option<u64>,

    /// Whether the file answered an existence probe
    pub exists: bool,

    /// When this state was recorded
    pub last_seen: DateTime<Local>,
}

impl FileState {
    /// Create a state stamped with the current time
    pub fn new(size: Option<u64>, exists: bool) -> Self {
        Self {
            size,
            exists,
            last_seen: Local::now(),
        }
    }

    /// Check whether an observation matches this state
    ///
    /// Only size and existence participate; the timestamp is informational.
    pub fn matches(&self, size: Option<u64>, exists: bool) -> bool {
        self.size == size && self.exists == exists
    }
}

/// Per-session map: filename → FileState
///
/// Filenames are single path components; the mirror never recurses.
#[derive(Debug, Clone, Default)]
pub struct FileStateTable {
    entries: HashMap<String, FileState>,
}

impl FileStateTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the state for a filename
    pub fn get(&self, name: &str) -> Option<&FileState> {
        self.entries.get(name)
    }

    /// Check if a filename is tracked
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Record (insert or replace) the state of a file
    pub fn record(&mut self, name: impl Into<String>, size: Option<u64>, exists: bool) {
        self.entries.insert(name.into(), FileState::new(size, exists));
    }

    /// Stop tracking a file
    pub fn remove(&mut self, name: &str) -> Option<FileState> {
        self.entries.remove(name)
    }

    /// Move a tracked entry to a new name
    ///
    /// Returns false when `from` was not tracked.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        match self.entries.remove(from) {
            Some(state) => {
                self.entries.insert(to.to_string(), state);
                true
            }
            None => false,
        }
    }

    /// Forget everything (after a reconnect)
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Tracked filenames, sorted for deterministic iteration
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of tracked files
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileState)> {
        self.entries.iter()
    }
}
