//! Per-session shared state

use chrono::{DateTime, Local};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// State shared by the running loop, the Ctrl-C handler, and the UI
#[derive(Debug, Default)]
pub struct SessionContext {
    cancel: CancellationToken,
    last_activity: Mutex<Option<DateTime<Local>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that stops the session when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ask every loop to stop at its next suspension point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stamp a successful mutation
    pub fn mark_activity(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Some(Local::now());
        }
    }

    /// Time of the last successful mutation
    pub fn last_activity(&self) -> Option<DateTime<Local>> {
        self.last_activity.lock().ok().and_then(|last| *last)
    }

    /// Sleep for `duration` unless the session is cancelled first
    ///
    /// Returns `false` when the sleep was cut short by cancellation.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
