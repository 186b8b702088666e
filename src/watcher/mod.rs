//! Local watcher (local → remote)
//!
//! notify events arrive through a bounded channel and are applied by a single
//! reconciler that owns the debounce map, the state table, and the
//! transport. Creates settle for a second before uploading, modifications
//! are coalesced until the file has been quiet for two seconds, and deletes
//! and renames go out immediately. A periodic pass over the folder catches
//! anything the event stream missed.

mod debounce;
mod events;
mod reconcile;

pub use debounce::Debouncer;
pub use events::{map_event, start_notify_watcher, LocalEvent, CHANNEL_CAPACITY};
pub use reconcile::{
    delete_remote, reconcile_local, scan_local_files, upload_file, LocalReconcileStats,
    UploadTarget,
};

use crate::config::{NameFilter, SyncConfig};
use crate::session::SessionContext;
use crate::supervisor::{Recovery, Supervisor};
use crate::transport::{remote_join, Transport};
use crate::types::{FileStateTable, SyncError};
use crate::ui::ProgressReporter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Wait after a create before the first upload
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Quiet period a modified file needs before it is uploaded
pub const DEBOUNCE_DELAY: Duration = Duration::from_secs(2);

/// Applies local changes to the remote folder
pub struct LocalWatcher {
    transport: Arc<dyn Transport>,
    local_root: PathBuf,
    remote_root: String,
    filter: NameFilter,
    base_interval: Duration,
    table: FileStateTable,
    pending: Debouncer,
    supervisor: Supervisor,
}

impl LocalWatcher {
    pub fn new(transport: Arc<dyn Transport>, config: &SyncConfig) -> Result<Self, SyncError> {
        Ok(Self {
            transport,
            local_root: config.local_root.clone(),
            remote_root: config.remote_root.clone(),
            filter: config.name_filter()?,
            base_interval: config.base_interval,
            table: FileStateTable::new(),
            pending: Debouncer::new(),
            supervisor: Supervisor::new(),
        })
    }

    pub fn with_supervisor(mut self, supervisor: Supervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn table(&self) -> &FileStateTable {
        &self.table
    }

    pub fn pending(&self) -> &Debouncer {
        &self.pending
    }

    /// Full pass over the local folder
    pub async fn reconcile(
        &mut self,
        session: &SessionContext,
        reporter: &ProgressReporter,
    ) -> Result<LocalReconcileStats, SyncError> {
        let target = UploadTarget {
            transport: self.transport.as_ref(),
            local_dir: &self.local_root,
            remote_dir: &self.remote_root,
        };
        let stats = reconcile_local(&target, &mut self.table, &self.filter, reporter).await?;
        if stats.changed() {
            session.mark_activity();
            info!(
                "Reconciled: {} uploaded, {} deleted, {} failed",
                stats.uploaded, stats.deleted, stats.failed
            );
        }
        Ok(stats)
    }

    /// Apply one filesystem event
    pub async fn handle_event(
        &mut self,
        event: LocalEvent,
        session: &SessionContext,
    ) -> Result<(), SyncError> {
        debug!("Local event: {:?}", event);
        let now = Instant::now();

        match event {
            LocalEvent::Created(name) => {
                if !self.filter.is_excluded(&name) {
                    self.pending.schedule_if_absent(name, now + SETTLE_DELAY);
                }
                Ok(())
            }
            LocalEvent::Modified(name) => {
                if !self.filter.is_excluded(&name) {
                    self.pending.schedule(name, now + DEBOUNCE_DELAY);
                }
                Ok(())
            }
            LocalEvent::Removed(name) => self.handle_removed(&name, session).await,
            LocalEvent::Renamed { from, to } => {
                match (self.filter.is_excluded(&from), self.filter.is_excluded(&to)) {
                    (true, true) => Ok(()),
                    (true, false) => {
                        self.pending.schedule(to, now + DEBOUNCE_DELAY);
                        Ok(())
                    }
                    (false, true) => self.handle_removed(&from, session).await,
                    (false, false) => self.handle_renamed(&from, &to, session).await,
                }
            }
        }
    }

    async fn handle_removed(&mut self, name: &str, session: &SessionContext) -> Result<(), SyncError> {
        if self.filter.is_excluded(name) {
            return Ok(());
        }
        if self.pending.cancel(name) {
            debug!("Dropped pending upload of {}", name);
        }
        if !self.table.contains(name) {
            debug!("{} was never uploaded, nothing to delete", name);
            return Ok(());
        }

        let target = UploadTarget {
            transport: self.transport.as_ref(),
            local_dir: &self.local_root,
            remote_dir: &self.remote_root,
        };
        delete_remote(&target, name, &mut self.table).await?;
        session.mark_activity();
        Ok(())
    }

    async fn handle_renamed(
        &mut self,
        from: &str,
        to: &str,
        session: &SessionContext,
    ) -> Result<(), SyncError> {
        // inotify reports the arriving half of a rename before the paired
        // event, which leaves a stale upload scheduled for `to`.
        let carried = self.pending.rekey(from, to);
        if carried {
            debug!("Pending upload moved from {} to {}", from, to);
        }
        if !self.table.contains(from) {
            self.pending
                .schedule_if_absent(to, Instant::now() + SETTLE_DELAY);
            return Ok(());
        }

        let remote_from = remote_join(&self.remote_root, from);
        let remote_to = remote_join(&self.remote_root, to);
        match self.transport.rename(&remote_from, &remote_to).await {
            Ok(()) => {
                if !carried && self.pending.cancel(to) {
                    debug!("Dropped upload of {} made redundant by the rename", to);
                }
                self.table.rename(from, to);
                session.mark_activity();
                info!("Renamed remote {} -> {}", remote_from, remote_to);
                Ok(())
            }
            Err(err) => match SyncError::transfer(to, err) {
                err @ SyncError::ConnectionLost(_) => Err(err),
                err @ SyncError::ProtocolLimitation(_) => {
                    self.table.remove(from);
                    Err(err)
                }
                err => {
                    error!("{}", err);
                    self.pending
                        .schedule_if_absent(to, Instant::now() + SETTLE_DELAY);
                    Ok(())
                }
            },
        }
    }

    /// Upload every pending file whose deadline has passed
    pub async fn fire_due(
        &mut self,
        session: &SessionContext,
        reporter: &ProgressReporter,
    ) -> Result<(), SyncError> {
        for name in self.pending.take_due(Instant::now()) {
            let target = UploadTarget {
                transport: self.transport.as_ref(),
                local_dir: &self.local_root,
                remote_dir: &self.remote_root,
            };
            match upload_file(&target, &name, &mut self.table, reporter).await {
                Ok(true) => session.mark_activity(),
                Ok(false) => {}
                Err(err) if err.needs_reconnect() => return Err(err),
                Err(err) => error!("{}", err),
            }
        }
        Ok(())
    }

    /// Route an error from the event path
    ///
    /// Connection loss goes through the supervisor; after a reconnect the
    /// table is rebuilt by a full reconciliation. Only fatal errors escape.
    async fn handle_failure(
        &mut self,
        err: SyncError,
        session: &SessionContext,
        reporter: &ProgressReporter,
    ) -> Result<(), SyncError> {
        let mut err = err;
        loop {
            if err.is_fatal() {
                return Err(err);
            }
            error!("{}", err);
            if !err.needs_reconnect() {
                return Ok(());
            }

            reporter.status("Reconnecting...");
            match self.supervisor.recover(self.transport.as_ref(), session).await? {
                Recovery::Cancelled => return Ok(()),
                Recovery::Reconnected => {
                    self.table.clear();
                    match self.reconcile(session, reporter).await {
                        Ok(_) => return Ok(()),
                        Err(next) => err = next,
                    }
                }
            }
        }
    }

    /// Process events until the session is cancelled or the channel closes
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<LocalEvent>,
        session: &SessionContext,
        reporter: &ProgressReporter,
    ) -> Result<(), SyncError> {
        info!(
            "Watching local folder {} -> {}",
            self.local_root.display(),
            self.remote_root
        );
        let cancel = session.cancel_token();

        if let Err(err) = self.reconcile(session, reporter).await {
            self.handle_failure(err, session, reporter).await?;
        }
        reporter.status("Watching for local changes");

        let mut safety_net = tokio::time::interval_at(
            Instant::now() + self.base_interval,
            self.base_interval,
        );
        safety_net.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let next_deadline = self.pending.next_deadline();
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, session).await,
                    None => {
                        warn!("File watcher channel closed");
                        break;
                    }
                },
                _ = sleep_until_deadline(next_deadline) => self.fire_due(session, reporter).await,
                _ = safety_net.tick() => self.reconcile(session, reporter).await.map(|_| ()),
            };

            if let Err(err) = result {
                self.handle_failure(err, session, reporter).await?;
            }
        }

        info!(
            "Local watcher stopped ({} uploads pending)",
            self.pending.len()
        );
        Ok(())
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Mirror the local folder until cancelled
pub async fn run_local_watcher(
    transport: Arc<dyn Transport>,
    config: &SyncConfig,
    session: &SessionContext,
    reporter: &ProgressReporter,
) -> Result<(), SyncError> {
    let (_watcher, events) = start_notify_watcher(&config.local_root)?;
    LocalWatcher::new(transport, config)?
        .run(events, session, reporter)
        .await
}
