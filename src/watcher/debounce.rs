//! Pending uploads keyed by filename

use std::collections::HashMap;
use tokio::time::Instant;

/// One replaceable deadline per filename
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: HashMap<String, Instant>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or push back) the deadline for `name`
    pub fn schedule(&mut self, name: impl Into<String>, deadline: Instant) {
        self.pending.insert(name.into(), deadline);
    }

    /// Set a deadline only if `name` has none yet
    pub fn schedule_if_absent(&mut self, name: impl Into<String>, deadline: Instant) {
        self.pending.entry(name.into()).or_insert(deadline);
    }

    /// Drop the pending upload for `name`
    pub fn cancel(&mut self, name: &str) -> bool {
        self.pending.remove(name).is_some()
    }

    /// Move a pending upload to a new name, keeping its deadline
    pub fn rekey(&mut self, from: &str, to: &str) -> bool {
        match self.pending.remove(from) {
            Some(deadline) => {
                self.pending.insert(to.to_string(), deadline);
                true
            }
            None => false,
        }
    }

    /// Earliest deadline, if anything is pending
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Remove and return every name due at `now`, earliest first
    pub fn take_due(&mut self, now: Instant) -> Vec<String> {
        let mut due: Vec<(Instant, String)> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(name, deadline)| (*deadline, name.clone()))
            .collect();
        due.sort();

        for (_, name) in &due {
            self.pending.remove(name);
        }
        due.into_iter().map(|(_, name)| name).collect()
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
