//! Remote poller (remote → local)

mod schedule;

pub use schedule::{PollState, FAST_INTERVAL, MEDIUM_INTERVAL};

use crate::config::{NameFilter, SyncConfig};
use crate::diff::reconcile_remote;
use crate::session::SessionContext;
use crate::supervisor::{Recovery, Supervisor};
use crate::transport::Transport;
use crate::types::{FileStateTable, SyncError};
use crate::ui::ProgressReporter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// What a single poll cycle ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The table changed
    Changed,
    /// Nothing to do (or the listing failed)
    Quiet,
    /// The connection was rebuilt; diff state starts over
    Reconnected,
    /// The session was cancelled while recovering
    Cancelled,
}

/// Polls a remote folder and mirrors it locally
pub struct RemotePoller {
    transport: Arc<dyn Transport>,
    remote_root: String,
    local_root: PathBuf,
    filter: NameFilter,
    table: FileStateTable,
    poll: PollState,
    supervisor: Supervisor,
}

impl RemotePoller {
    pub fn new(transport: Arc<dyn Transport>, config: &SyncConfig) -> Result<Self, SyncError> {
        Ok(Self {
            transport,
            remote_root: config.remote_root.clone(),
            local_root: config.local_root.clone(),
            filter: config.name_filter()?,
            table: FileStateTable::new(),
            poll: PollState::new(config.base_interval),
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

    pub fn poll_state(&self) -> &PollState {
        &self.poll
    }

    /// Run one diff cycle and update the schedule
    pub async fn run_cycle(
        &mut self,
        session: &SessionContext,
        reporter: &ProgressReporter,
    ) -> Result<CycleOutcome, SyncError> {
        let result = reconcile_remote(
            self.transport.as_ref(),
            &self.remote_root,
            &self.local_root,
            &mut self.table,
            &self.filter,
            reporter,
        )
        .await;

        match result {
            Ok(true) => {
                session.mark_activity();
                self.poll.record(true);
                Ok(CycleOutcome::Changed)
            }
            Ok(false) => {
                self.poll.record(false);
                Ok(CycleOutcome::Quiet)
            }
            Err(err) if err.needs_reconnect() => {
                error!("{}", err);
                reporter.status("Reconnecting...");
                match self.supervisor.recover(self.transport.as_ref(), session).await? {
                    Recovery::Reconnected => {
                        self.table.clear();
                        self.poll.reset();
                        Ok(CycleOutcome::Reconnected)
                    }
                    Recovery::Cancelled => Ok(CycleOutcome::Cancelled),
                }
            }
            Err(err) if err.is_recoverable() => {
                error!("{}", err);
                self.poll.record(false);
                Ok(CycleOutcome::Quiet)
            }
            Err(err) => Err(err),
        }
    }

    /// Poll until the session is cancelled or the connection cannot be restored
    pub async fn run(
        mut self,
        session: &SessionContext,
        reporter: &ProgressReporter,
    ) -> Result<(), SyncError> {
        info!(
            "Watching remote folder {} -> {}",
            self.remote_root,
            self.local_root.display()
        );

        while !session.is_cancelled() {
            let outcome = self.run_cycle(session, reporter).await?;
            debug!("Cycle finished: {:?}", outcome);

            match outcome {
                CycleOutcome::Cancelled => break,
                CycleOutcome::Reconnected => continue,
                CycleOutcome::Changed | CycleOutcome::Quiet => {}
            }

            if !countdown_sleep(self.poll.interval(), session, reporter).await {
                break;
            }
        }

        info!("Remote poller stopped");
        Ok(())
    }
}

/// Sleep in one-second ticks, reporting the countdown on each tick
///
/// Returns `false` as soon as the session is cancelled.
pub async fn countdown_sleep(
    wait: Duration,
    session: &SessionContext,
    reporter: &ProgressReporter,
) -> bool {
    let tick = Duration::from_secs(1);
    let mut remaining = wait.as_secs().max(1);

    while remaining > 0 {
        reporter.countdown(remaining);
        if !session.sleep(tick).await {
            return false;
        }
        remaining -= 1;
    }
    true
}

/// Mirror a remote folder until cancelled
pub async fn run_remote_poller(
    transport: Arc<dyn Transport>,
    config: &SyncConfig,
    session: &SessionContext,
    reporter: &ProgressReporter,
) -> Result<(), SyncError> {
    RemotePoller::new(transport, config)?
        .run(session, reporter)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_countdown_sleep_takes_the_full_wait() {
        let session = SessionContext::new();
        let started = tokio::time::Instant::now();

        assert!(countdown_sleep(Duration::from_secs(5), &session, &ProgressReporter::hidden()).await);
        assert_eq!(started.elapsed().as_secs(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_sleep_stops_on_cancel() {
        let session = Arc::new(SessionContext::new());
        let canceller = Arc::clone(&session);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            canceller.cancel();
        });

        let started = tokio::time::Instant::now();
        let finished =
            countdown_sleep(Duration::from_secs(60), &session, &ProgressReporter::hidden()).await;

        assert!(!finished);
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
