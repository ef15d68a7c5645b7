use std::time::Duration;

use camlink_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};

use crate::error::{PeerError, Result};

/// What the client role does with a request whose name it cannot route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnroutablePolicy {
    /// Answer with an error envelope so the caller fails fast.
    #[default]
    Reply,
    /// Send nothing; the caller runs into its own timeout.
    Ignore,
}

/// Timing and sizing knobs for a link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Upper bound on one readiness wait; also bounds how late a stop is noticed.
    pub poll_interval: Duration,
    /// Send a heartbeat when nothing else was sent for this long.
    pub heartbeat_interval: Duration,
    /// Declare the peer dead after receiving nothing for this long.
    /// Must be strictly greater than `heartbeat_interval`.
    pub heartbeat_timeout: Duration,
    /// Pause between failed dial attempts (client role) or accept errors.
    pub retry_interval: Duration,
    /// Bound on a single dial attempt.
    pub connect_timeout: Duration,
    /// Largest payload accepted in either direction.
    pub max_frame_size: usize,
    /// Unmatched inbound messages kept before the oldest are dropped.
    pub max_unmatched: usize,
    /// Per-call deadline used by the server role.
    pub request_timeout: Duration,
    /// Client role handling of requests it cannot route.
    pub unroutable: UnroutablePolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(1),
            max_frame_size: DEFAULT_MAX_PAYLOAD,
            max_unmatched: 256,
            request_timeout: Duration::from_secs(10),
            unroutable: UnroutablePolicy::Reply,
        }
    }
}

impl LinkConfig {
    /// Reject settings the link cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(PeerError::InvalidConfig(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(PeerError::InvalidConfig(
                "heartbeat_interval must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_timeout <= self.heartbeat_interval {
            return Err(PeerError::InvalidConfig(format!(
                "heartbeat_timeout ({:?}) must exceed heartbeat_interval ({:?})",
                self.heartbeat_timeout, self.heartbeat_interval
            )));
        }
        if self.max_frame_size == 0 {
            return Err(PeerError::InvalidConfig(
                "max_frame_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_frame_size,
        }
    }
}
