//! Liveness bookkeeping for one connection.
//!
//! Times are passed in rather than read from the clock so the worker samples
//! `Instant::now()` once per iteration.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    last_sent: Instant,
    last_received: Instant,
}

impl Heartbeat {
    pub fn new(interval: Duration, timeout: Duration, now: Instant) -> Self {
        Self {
            interval,
            timeout,
            last_sent: now,
            last_received: now,
        }
    }

    /// Restart both timers for a fresh connection.
    pub fn reset(&mut self, now: Instant) {
        self.last_sent = now;
        self.last_received = now;
    }

    /// Bytes went out.
    pub fn record_sent(&mut self, now: Instant) {
        self.last_sent = now;
    }

    /// Bytes came in, heartbeat or otherwise.
    pub fn record_received(&mut self, now: Instant) {
        self.last_received = now;
    }

    /// Nothing was sent for a full interval.
    pub fn should_send(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_sent) >= self.interval
    }

    /// Nothing was received for the whole timeout window.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_received) >= self.timeout
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
