//! Inbound message store shared by the link worker and waiting callers.
//!
//! Responses to registered requests are indexed by correlation ID; anything
//! else lands in a bounded unmatched queue. Callers block on a condition
//! variable instead of polling. Every ticket carries a deadline, and tickets
//! or stored responses past it are purged whether or not anyone waits.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use camlink_frame::{CorrelationId, Envelope};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy)]
struct Pending {
    issued: Instant,
    deadline: Instant,
}

/// A response body waiting for its caller to collect it.
#[derive(Debug)]
struct Arrived {
    body: Bytes,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct MailboxState {
    pending: HashMap<CorrelationId, Pending>,
    responses: HashMap<CorrelationId, Arrived>,
    unmatched: VecDeque<Bytes>,
}

impl MailboxState {
    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.pending.len() + self.responses.len();
        self.pending.retain(|_, ticket| ticket.deadline > now);
        self.responses.retain(|_, arrived| arrived.deadline > now);
        let purged = before - (self.pending.len() + self.responses.len());
        if purged > 0 {
            debug!(purged, outstanding = self.pending.len(), "expired tickets dropped");
        }
        purged
    }
}

#[derive(Debug)]
pub(crate) struct Mailbox {
    state: Mutex<MailboxState>,
    arrived: Condvar,
    max_unmatched: usize,
}

impl Mailbox {
    pub(crate) fn new(max_unmatched: usize) -> Self {
        Self {
            state: Mutex::new(MailboxState::default()),
            arrived: Condvar::new(),
            max_unmatched,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Expect a response under `id` until `deadline`. Must happen before the
    /// request is sent.
    pub(crate) fn register(&self, id: CorrelationId, deadline: Instant) {
        let issued = Instant::now();
        self.lock().pending.insert(id, Pending { issued, deadline });
    }

    /// Forget a ticket, along with any response already stored for it.
    pub(crate) fn cancel(&self, id: &CorrelationId) {
        let mut state = self.lock();
        state.pending.remove(id);
        state.responses.remove(id);
    }

    /// Drop tickets and uncollected responses whose deadline has passed.
    pub(crate) fn purge_expired(&self, now: Instant) -> usize {
        self.lock().purge_expired(now)
    }

    /// Store one inbound payload that nobody else consumed.
    pub(crate) fn deliver(&self, payload: Bytes) {
        let mut state = self.lock();
        state.purge_expired(Instant::now());

        if let Some(id) = CorrelationId::from_prefix(&payload) {
            if let Some(ticket) = state.pending.remove(&id) {
                trace!(%id, elapsed = ?ticket.issued.elapsed(), "response matched");
                if let Ok(envelope) = Envelope::parse(payload) {
                    let arrived = Arrived {
                        body: envelope.body,
                        deadline: ticket.deadline,
                    };
                    state.responses.insert(id, arrived);
                    drop(state);
                    self.arrived.notify_all();
                }
                return;
            }
        }

        if state.unmatched.len() >= self.max_unmatched {
            if let Some(dropped) = state.unmatched.pop_front() {
                warn!(bytes = dropped.len(), "unmatched queue full; dropping oldest message");
            }
        }
        state.unmatched.push_back(payload);
        drop(state);
        self.arrived.notify_all();
    }

    /// Wait until the response for `id` arrives or `timeout` elapses.
    ///
    /// The ticket lives at least as long as the wait. On timeout it is
    /// removed, so a late response is treated as unmatched.
    pub(crate) fn wait_for(&self, id: &CorrelationId, timeout: Duration) -> Option<Bytes> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        if let Some(ticket) = state.pending.get_mut(id) {
            ticket.deadline = ticket.deadline.max(deadline);
        }
        if let Some(arrived) = state.responses.get_mut(id) {
            arrived.deadline = arrived.deadline.max(deadline);
        }

        loop {
            if let Some(arrived) = state.responses.remove(id) {
                return Some(arrived.body);
            }
            let now = Instant::now();
            if now >= deadline {
                state.pending.remove(id);
                return None;
            }
            state = self
                .arrived
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Oldest unmatched message, if any.
    pub(crate) fn take_unmatched(&self) -> Option<Bytes> {
        self.lock().unmatched.pop_front()
    }

    pub(crate) fn unmatched_len(&self) -> usize {
        self.lock().unmatched.len()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }
}
