//! Diff engine - Remote listing comparison, plan generation, and execution

mod apply;
mod compare;
mod plan;

pub use apply::{execute_plan, part_file, ExecutionStats, MirrorTarget, PART_SUFFIX};
pub use compare::compare_state;
pub use plan::{plan_remote_changes, DiffPlan, PlanStats, RemoteObservation};

use crate::config::NameFilter;
use crate::transport::{remote_join, Transport};
use crate::types::{FileStateTable, SyncError};
use crate::ui::ProgressReporter;
use std::path::Path;
use tracing::debug;

/// Run one remote → local reconciliation
///
/// Lists `remote_dir`, probes every non-excluded entry, and applies the
/// resulting plan to `local_dir`. Returns `true` iff a table entry was
/// inserted, replaced, or removed.
///
/// A listing failure returns `SyncError::Listing` without planning anything,
/// so an unreadable directory never looks like "every file was deleted".
pub async fn reconcile_remote(
    transport: &dyn Transport,
    remote_dir: &str,
    local_dir: &Path,
    table: &mut FileStateTable,
    filter: &NameFilter,
    reporter: &ProgressReporter,
) -> Result<bool, SyncError> {
    let names = transport
        .list_entries(remote_dir)
        .await
        .map_err(|source| {
            if source.is_connection_lost() {
                SyncError::ConnectionLost(source)
            } else {
                SyncError::Listing {
                    path: remote_dir.to_string(),
                    source,
                }
            }
        })?;

    let mut observed = Vec::with_capacity(names.len());
    for name in names {
        if filter.is_excluded(&name) {
            continue;
        }
        let (size, exists) = transport.probe(&remote_join(remote_dir, &name)).await;
        observed.push(RemoteObservation::new(name, size, exists));
    }

    let plan = plan_remote_changes(&observed, table);
    debug!(
        "Planned {} new, {} changed, {} removed, {} unchanged",
        plan.stats.download_count,
        plan.stats.redownload_count,
        plan.stats.delete_count,
        plan.stats.skip_count
    );
    if plan.is_empty() {
        return Ok(false);
    }

    let target = MirrorTarget {
        transport,
        remote_dir,
        local_dir,
    };
    let stats = execute_plan(&plan, &target, table, reporter).await?;
    Ok(stats.changed())
}
