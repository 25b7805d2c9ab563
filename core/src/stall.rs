//! Idle detection for reads that return no data while the peer stays connected.

use std::time::{Duration, Instant};

use crate::error::PullError;

/// How long a connection may stay silent before a pull gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallPolicy {
    pub idle_timeout: Duration,
    /// Sleep between polls while no data is available.
    pub poll_interval: Duration,
    /// Empty polls allowed in a row, whatever the clock says.
    pub max_idle_polls: u32,
}

impl Default for StallPolicy {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(10),
            max_idle_polls: 3000,
        }
    }
}

impl StallPolicy {
    pub fn watchdog(&self) -> Watchdog {
        Watchdog {
            policy: *self,
            last_progress: Instant::now(),
            idle_polls: 0,
        }
    }
}

/// Tracks the time and the number of empty polls since the last byte arrived.
#[derive(Debug)]
pub struct Watchdog {
    policy: StallPolicy,
    last_progress: Instant,
    idle_polls: u32,
}

impl Watchdog {
    pub fn progressed(&mut self) {
        self.last_progress = Instant::now();
        self.idle_polls = 0;
    }

    /// Called after an empty read. Sleeps one poll interval, or fails once
    /// the idle timeout has elapsed or the poll budget is spent.
    pub fn idle(&mut self) -> Result<(), PullError> {
        self.idle_polls = self.idle_polls.saturating_add(1);
        if self.idle_polls > self.policy.max_idle_polls
            || self.last_progress.elapsed() >= self.policy.idle_timeout
        {
            return Err(PullError::StreamStalled(self.last_progress.elapsed()));
        }
        if !self.policy.poll_interval.is_zero() {
            std::thread::sleep(self.policy.poll_interval);
        }
        Ok(())
    }
}
