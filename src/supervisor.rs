//! Reconnect supervisor

use crate::session::SessionContext;
use crate::transport::Transport;
use crate::types::SyncError;
use std::time::Duration;
use tracing::{error, info, warn};

/// Pause between dropping a broken connection and dialing again
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Outcome of a recovery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// A fresh connection is up; diff state must be rebuilt
    Reconnected,
    /// The session was cancelled during the back-off
    Cancelled,
}

/// Restores the connection after a transport failure
///
/// One attempt per failure: if the server cannot be reached again the
/// session ends with `SyncError::Connection`.
#[derive(Debug, Clone)]
pub struct Supervisor {
    delay: Duration,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            delay: RECONNECT_DELAY,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Disconnect, back off, reconnect once
    pub async fn recover(
        &self,
        transport: &dyn Transport,
        session: &SessionContext,
    ) -> Result<Recovery, SyncError> {
        warn!(
            "Connection to {} server lost, reconnecting in {}s",
            transport.label(),
            self.delay.as_secs()
        );
        transport.disconnect().await;

        if !session.sleep(self.delay).await {
            return Ok(Recovery::Cancelled);
        }

        match transport.connect().await {
            Ok(()) => {
                info!("Reconnected to {} server", transport.label());
                Ok(Recovery::Reconnected)
            }
            Err(err) => {
                error!("Reconnect failed: {}", err);
                Err(SyncError::Connection(err.to_string()))
            }
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
