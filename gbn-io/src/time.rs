//! Time utilities for the protocol engine

use std::time::{Duration, Instant};

/// How long to wait for `deadline`, never longer than `cap`
///
/// With no deadline the full `cap` is returned.
pub fn time_until(deadline: Option<Instant>, now: Instant, cap: Duration) -> Duration {
    match deadline {
        Some(at) => at.saturating_duration_since(now).min(cap),
        None => cap,
    }
}

/// Timer for periodic operations
///
/// Used for periodic progress reports during long transfers.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    interval: Duration,
    last_fire: Instant,
}

impl Timer {
    /// Create a new timer with the given interval, starting at `now`
    pub fn new(interval: Duration, now: Instant) -> Self {
        Timer {
            interval,
            last_fire: now,
        }
    }

    /// Check if the timer has expired
    pub fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_fire) >= self.interval
    }

    /// Fire the timer if expired, returning true if it fired
    pub fn try_fire(&mut self, now: Instant) -> bool {
        if self.expired(now) {
            self.last_fire = now;
            true
        } else {
            false
        }
    }
}
