//! File state comparison logic

use crate::types::{FileState, SyncAction};

/// Compare one remote observation with its stored state
///
/// Only `(size, exists)` participate:
///
/// 1. **Untracked**: the name is not in the table → `Download`
/// 2. **Changed**: size or existence differ from the stored state → `Redownload`
/// 3. **Unchanged**: identical observation → `Skip`
///
/// An unknown size (`None`) is a value of its own, so a file whose size
/// becomes readable again counts as changed.
pub fn compare_state(
    stored: Option<&FileState>,
    name: &str,
    size: Option<u64>,
    exists: bool,
) -> SyncAction {
    match stored {
        None => SyncAction::Download {
            name: name.to_string(),
            size,
            exists,
        },
        Some(state) if !state.matches(size, exists) => SyncAction::Redownload {
            name: name.to_string(),
            size,
            exists,
        },
        Some(_) => SyncAction::Skip,
    }
}
