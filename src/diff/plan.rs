//! SyncAction plan generation

use crate::diff::compare_state;
use crate::types::{FileStateTable, SyncAction};
use std::collections::HashSet;

/// `(size, exists)` observed for one remote file during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObservation {
    pub name: String,
    pub size: Option<u64>,
    pub exists: bool,
}

impl RemoteObservation {
    pub fn new(name: impl Into<String>, size: Option<u64>, exists: bool) -> Self {
        Self {
            name: name.into(),
            size,
            exists,
        }
    }
}

/// Plan for one poll cycle: actions plus counters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiffPlan {
    /// Non-skip actions in execution order: transfers first, then deletions
    pub actions: Vec<SyncAction>,

    pub stats: PlanStats,
}

impl DiffPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an action and update statistics
    pub fn add_action(&mut self, action: SyncAction) {
        match &action {
            SyncAction::Download { .. } => self.stats.download_count += 1,
            SyncAction::Redownload { .. } => self.stats.redownload_count += 1,
            SyncAction::DeleteLocal(_) => self.stats.delete_count += 1,
            SyncAction::Skip => {
                self.stats.skip_count += 1;
                return;
            }
        }
        self.actions.push(action);
    }

    /// Check if the cycle has nothing to do
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Statistics about a diff plan
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlanStats {
    pub download_count: usize,
    pub redownload_count: usize,
    pub delete_count: usize,
    pub skip_count: usize,
}

/// Compare one remote listing with the state table
///
/// Every observed file is classified with [`compare_state`]; every tracked
/// name missing from the listing becomes a `DeleteLocal`. The table is not
/// touched: entries change only once the actions have succeeded.
///
/// # Example
/// ```
/// use mirrorwatch::diff::{plan_remote_changes, RemoteObservation};
/// use mirrorwatch::types::FileStateTable;
///
/// let mut table = FileStateTable::new();
/// table.record("gone.txt", Some(50), true);
///
/// let observed = vec![RemoteObservation::new("a.txt", Some(100), true)];
/// let plan = plan_remote_changes(&observed, &table);
/// assert_eq!(plan.stats.download_count, 1);
/// assert_eq!(plan.stats.delete_count, 1);
/// ```
pub fn plan_remote_changes(observed: &[RemoteObservation], table: &FileStateTable) -> DiffPlan {
    let mut plan = DiffPlan::new();
    let mut listed: HashSet<&str> = HashSet::with_capacity(observed.len());

    for entry in observed {
        if !listed.insert(entry.name.as_str()) {
            continue;
        }
        plan.add_action(compare_state(
            table.get(&entry.name),
            &entry.name,
            entry.size,
            entry.exists,
        ));
    }

    for name in table.names() {
        if !listed.contains(name.as_str()) {
            plan.add_action(SyncAction::DeleteLocal(name));
        }
    }

    plan
}
