use std::time::{Duration, Instant};

use bytes::Bytes;
use camlink_frame::{CorrelationId, Envelope};
use tracing::debug;

use crate::error::{PeerError, Result};
use crate::link::LinkHandle;

/// A request that has been queued and is waiting for its response.
#[derive(Debug, Clone, Copy)]
pub struct Ticket {
    id: CorrelationId,
    issued: Instant,
    deadline: Instant,
}

impl Ticket {
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    pub fn issued(&self) -> Instant {
        self.issued
    }

    /// After this instant the link forgets the ticket unless a caller is
    /// still waiting on it.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Pairs outbound requests with inbound responses over a link.
///
/// Any number of requests may be outstanding at once; each is matched by its
/// own 128-bit identifier, so responses may arrive in any order.
#[derive(Debug, Clone)]
pub struct Correlator {
    link: LinkHandle,
}

impl Correlator {
    pub fn new(link: LinkHandle) -> Self {
        Self { link }
    }

    /// Queue `body` under a fresh correlation ID.
    ///
    /// The ticket expires after the link's configured request timeout.
    pub fn send_request(&self, body: &[u8]) -> Result<Ticket> {
        self.issue(body, self.link.config().request_timeout)
    }

    fn issue(&self, body: &[u8], lifetime: Duration) -> Result<Ticket> {
        let id = CorrelationId::random();
        let issued = Instant::now();
        let deadline = issued + lifetime;
        // Register first: the response may arrive before `send` returns.
        self.link.mailbox().register(id, deadline);

        let payload = Envelope::new(id, Bytes::copy_from_slice(body)).to_payload();
        if let Err(err) = self.link.send(&payload) {
            self.link.mailbox().cancel(&id);
            return Err(err);
        }

        debug!(%id, bytes = body.len(), "request queued");
        Ok(Ticket {
            id,
            issued,
            deadline,
        })
    }

    /// Wait for the response to `id`.
    ///
    /// Fails with [`PeerError::Timeout`] no earlier than `timeout` after the
    /// call when no matching response arrives.
    pub fn await_response(&self, id: CorrelationId, timeout: Duration) -> Result<Bytes> {
        match self.link.mailbox().wait_for(&id, timeout) {
            Some(body) => Ok(body),
            None => {
                debug!(%id, ?timeout, "request timed out");
                Err(PeerError::Timeout(timeout))
            }
        }
    }

    /// Send a request and wait for its response.
    pub fn request(&self, body: &[u8], timeout: Duration) -> Result<Bytes> {
        let ticket = self.issue(body, timeout)?;
        self.await_response(ticket.id(), timeout)
    }

    /// Oldest inbound message that matched no request and no handler.
    pub fn take_unmatched(&self) -> Option<Bytes> {
        self.link.mailbox().take_unmatched()
    }

    /// Requests still waiting for a response.
    pub fn outstanding(&self) -> usize {
        self.link.mailbox().pending_len()
    }

    pub fn link(&self) -> &LinkHandle {
        &self.link
    }
}
