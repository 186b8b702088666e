//! Adaptive poll interval

use std::time::Duration;

/// Interval used right after a change and for the first quiet cycles
pub const FAST_INTERVAL: Duration = Duration::from_secs(5);

/// Interval used once the remote side has been quiet for a while
pub const MEDIUM_INTERVAL: Duration = Duration::from_secs(15);

const FAST_CYCLES: u32 = 3;
const MEDIUM_CYCLES: u32 = 6;

/// Quiet-cycle counter driving the poll interval
///
/// | quiet cycles | interval |
/// |---|---|
/// | 0–3 | 5 s |
/// | 4–6 | 15 s |
/// | 7+ | base interval |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    quiet_cycles: u32,
    interval: Duration,
    base_interval: Duration,
}

impl PollState {
    pub fn new(base_interval: Duration) -> Self {
        Self {
            quiet_cycles: 0,
            interval: FAST_INTERVAL,
            base_interval,
        }
    }

    /// Feed the outcome of one cycle
    pub fn record(&mut self, changed: bool) {
        if changed {
            self.reset();
            return;
        }

        self.quiet_cycles = self.quiet_cycles.saturating_add(1);
        self.interval = if self.quiet_cycles <= FAST_CYCLES {
            FAST_INTERVAL
        } else if self.quiet_cycles <= MEDIUM_CYCLES {
            MEDIUM_INTERVAL
        } else {
            self.base_interval
        };
    }

    /// Back to the initial fast state
    pub fn reset(&mut self) {
        self.quiet_cycles = 0;
        self.interval = FAST_INTERVAL;
    }

    /// Wait before the next cycle
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn quiet_cycles(&self) -> u32 {
        self.quiet_cycles
    }

    pub fn is_initial(&self) -> bool {
        self.quiet_cycles == 0 && self.interval == FAST_INTERVAL
    }
}
