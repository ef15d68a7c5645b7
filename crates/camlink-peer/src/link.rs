//! The link manager: one self-healing connection per process role.
//!
//! A [`Link`] owns a dedicated worker thread. All socket I/O for the link
//! happens on that thread. Callers talk to it only through the shared write
//! buffer and the mailbox, so any thread may send or wait.
//!
//! ```text
//! Disconnected ──acquire──▶ Connecting ──ok──▶ Connected
//!      ▲                                          │
//!      └──────── I/O error | heartbeat timeout ───┘
//! any state ──stop()──▶ Stopped
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use camlink_frame::{is_heartbeat, FrameReader, FrameWriter, HEARTBEAT};
use camlink_transport::{dial, Interest, LinkStream, TcpEndpoint, TransportError};
use tracing::{debug, info, trace, warn};

use crate::config::LinkConfig;
use crate::error::{PeerError, Result};
use crate::heartbeat::Heartbeat;
use crate::mailbox::Mailbox;

/// Connection state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal. Reached only through [`Link::stop`].
    Stopped,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// How a link obtains its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Bind `addr` and accept one peer at a time.
    Listen(String),
    /// Dial `addr` until it answers.
    Dial(String),
}

/// What an inbound handler did with a payload.
#[derive(Debug)]
pub enum Inbound {
    /// Consumed; send this payload back to the peer.
    Reply(Bytes),
    /// Consumed; nothing to send.
    Consumed,
    /// Not for the handler; store it in the mailbox.
    Unhandled,
}

/// Hook run on the worker thread for every non-heartbeat inbound payload.
pub trait InboundHandler: Send + 'static {
    fn handle(&mut self, payload: &Bytes) -> Inbound;
}

struct Shared {
    config: LinkConfig,
    outbound: Mutex<FrameWriter>,
    mailbox: Mailbox,
    state: Mutex<LinkState>,
    state_changed: Condvar,
    running: AtomicBool,
    disconnect_requested: AtomicBool,
    local_addr: Option<SocketAddr>,
}

impl Shared {
    fn outbound(&self) -> MutexGuard<'_, FrameWriter> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> LinkState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: LinkState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            debug!(from = %*state, to = %next, "link state change");
            *state = next;
            self.state_changed.notify_all();
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Cloneable handle onto a running link.
///
/// Everything here is safe to call from any thread.
#[derive(Clone)]
pub struct LinkHandle {
    shared: Arc<Shared>,
}

impl LinkHandle {
    /// Frame `payload` and queue it for the worker to write.
    ///
    /// Queued frames survive reconnects; they go out once a connection exists.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        if !self.shared.running() {
            return Err(PeerError::Stopped);
        }
        self.shared.outbound().push(payload)?;
        Ok(())
    }

    pub fn state(&self) -> LinkState {
        self.shared.state()
    }

    /// Wait until the link is connected. Returns false on timeout or stop.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            match *state {
                LinkState::Connected => return true,
                LinkState::Stopped => return false,
                _ => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .state_changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Drop the current connection. The worker immediately starts acquiring
    /// a new one.
    pub fn disconnect(&self) {
        self.shared.disconnect_requested.store(true, Ordering::SeqCst);
    }

    /// Bound listening address (server role only).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.local_addr
    }

    /// Bytes waiting in the write buffer.
    pub fn queued_bytes(&self) -> usize {
        self.shared.outbound().queued_bytes()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    pub(crate) fn mailbox(&self) -> &Mailbox {
        &self.shared.mailbox
    }
}

impl fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkHandle")
            .field("state", &self.state())
            .field("local_addr", &self.shared.local_addr)
            .finish()
    }
}

/// A managed, self-reconnecting connection and its worker thread.
///
/// Dropping a link stops it.
pub struct Link {
    handle: LinkHandle,
    worker: Option<JoinHandle<()>>,
}

impl Link {
    /// Start a link for `role`.
    ///
    /// The listen role binds before returning, so bind errors surface here.
    /// Connection problems after that are never returned: the worker logs
    /// them and reconnects until [`Link::stop`].
    pub fn spawn(
        role: Role,
        config: LinkConfig,
        handler: Option<Box<dyn InboundHandler>>,
    ) -> Result<Self> {
        config.validate()?;

        let (acquire, local_addr) = match role {
            Role::Listen(addr) => {
                let endpoint = TcpEndpoint::bind(&addr)?;
                let local_addr = endpoint.local_addr();
                (Acquire::Listen(endpoint), Some(local_addr))
            }
            Role::Dial(addr) => (Acquire::Dial(addr), None),
        };

        let shared = Arc::new(Shared {
            outbound: Mutex::new(FrameWriter::with_config(config.frame_config())),
            mailbox: Mailbox::new(config.max_unmatched),
            state: Mutex::new(LinkState::Disconnected),
            state_changed: Condvar::new(),
            running: AtomicBool::new(true),
            disconnect_requested: AtomicBool::new(false),
            local_addr,
            config,
        });

        let worker = Worker {
            reader: FrameReader::with_config(shared.config.frame_config()),
            heartbeat: Heartbeat::new(
                shared.config.heartbeat_interval,
                shared.config.heartbeat_timeout,
                Instant::now(),
            ),
            shared: Arc::clone(&shared),
            acquire,
            handler,
        };

        let thread_name = match &worker.acquire {
            Acquire::Listen(_) => "camlink-listen",
            Acquire::Dial(_) => "camlink-dial",
        };
        let worker = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || worker.run())
            .map_err(TransportError::Io)?;

        Ok(Self {
            handle: LinkHandle { shared },
            worker: Some(worker),
        })
    }

    /// Server side: listen on `addr`, no inbound handler.
    pub fn listen(addr: &str, config: LinkConfig) -> Result<Self> {
        Self::spawn(Role::Listen(addr.to_string()), config, None)
    }

    /// Client side: dial `addr`, no inbound handler.
    pub fn dial(addr: &str, config: LinkConfig) -> Result<Self> {
        Self::spawn(Role::Dial(addr.to_string()), config, None)
    }

    /// A cloneable handle for callers on other threads.
    pub fn handle(&self) -> LinkHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> LinkState {
        self.handle.state()
    }

    pub fn send(&self, payload: &[u8]) -> Result<()> {
        self.handle.send(payload)
    }

    pub fn wait_connected(&self, timeout: Duration) -> bool {
        self.handle.wait_connected(timeout)
    }

    pub fn disconnect(&self) {
        self.handle.disconnect();
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.local_addr()
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// No socket I/O happens after this returns. The listening socket, if
    /// any, is closed. Callers blocked waiting for a response are not woken
    /// early; they run into their own deadlines.
    pub fn stop(&mut self) {
        self.handle.shared.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("link worker panicked");
            }
            self.handle.shared.set_state(LinkState::Stopped);
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").field("handle", &self.handle).finish()
    }
}

enum Acquire {
    Listen(TcpEndpoint),
    Dial(String),
}

/// Why a connection's session ended.
enum SessionEnd {
    Stopped,
    Lost(PeerError),
    DisconnectRequested,
    /// Server role: a new peer arrived and takes over.
    Replaced(LinkStream),
}

struct Worker {
    shared: Arc<Shared>,
    acquire: Acquire,
    handler: Option<Box<dyn InboundHandler>>,
    reader: FrameReader,
    heartbeat: Heartbeat,
}

impl Worker {
    fn run(mut self) {
        let mut next: Option<LinkStream> = None;

        while self.shared.running() {
            let mut stream = match next.take() {
                Some(stream) => stream,
                None => {
                    self.shared.set_state(LinkState::Connecting);
                    match self.acquire() {
                        Some(stream) => stream,
                        None => break,
                    }
                }
            };

            let peer = stream.peer_addr();
            self.begin_session();
            self.shared.set_state(LinkState::Connected);
            info!(%peer, "camera link connected");

            let end = self.serve(&mut stream);
            stream.shutdown();
            self.shared.set_state(LinkState::Disconnected);

            match end {
                SessionEnd::Stopped => break,
                SessionEnd::Lost(err) => {
                    warn!(%peer, error = %err, "camera link lost; reconnecting");
                }
                SessionEnd::DisconnectRequested => {
                    info!(%peer, "camera link dropped on request");
                }
                SessionEnd::Replaced(replacement) => {
                    info!(old = %peer, new = %replacement.peer_addr(), "replacing camera link peer");
                    next = Some(replacement);
                }
            }
        }

        self.shared.set_state(LinkState::Stopped);
        debug!("link worker exiting");
    }

    /// Block until a connection exists or the link is stopped.
    fn acquire(&self) -> Option<LinkStream> {
        let config = &self.shared.config;
        let mut attempts = 0u64;

        while self.shared.running() {
            self.shared.mailbox.purge_expired(Instant::now());
            match &self.acquire {
                Acquire::Listen(endpoint) => {
                    match endpoint.accept_timeout(config.poll_interval) {
                        Ok(Some(stream)) => return Some(stream),
                        Ok(None) => {}
                        Err(err) => {
                            warn!(error = %err, "accept failed");
                            self.pause(config.retry_interval);
                        }
                    }
                }
                Acquire::Dial(addr) => match dial(addr, config.connect_timeout) {
                    Ok(stream) => return Some(stream),
                    Err(err) => {
                        attempts += 1;
                        if attempts == 1 {
                            warn!(%addr, error = %err, "could not reach camera link; retrying");
                        } else {
                            debug!(%addr, attempts, error = %err, "dial retry failed");
                        }
                        self.pause(config.retry_interval);
                    }
                },
            }
        }

        None
    }

    /// Sleep up to `total`, waking early if the link is stopped.
    fn pause(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.shared.running() {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(self.shared.config.poll_interval));
        }
    }

    fn begin_session(&mut self) {
        self.reader.clear();
        self.heartbeat.reset(Instant::now());
        self.shared.disconnect_requested.store(false, Ordering::SeqCst);
        if self.shared.outbound().rewind_partial() {
            debug!("resending frame cut short by the previous connection");
        }
    }

    fn serve(&mut self, stream: &mut LinkStream) -> SessionEnd {
        let poll_interval = self.shared.config.poll_interval;

        loop {
            if !self.shared.running() {
                return SessionEnd::Stopped;
            }
            if self.shared.disconnect_requested.swap(false, Ordering::SeqCst) {
                return SessionEnd::DisconnectRequested;
            }

            let pending_write = !self.shared.outbound().is_empty();
            let ready = match stream.wait(Interest::with_pending_write(pending_write), poll_interval)
            {
                Ok(ready) => ready,
                Err(err) => return SessionEnd::Lost(err.into()),
            };

            let now = Instant::now();
            self.shared.mailbox.purge_expired(now);
            if let Err(err) = self.keep_alive(now) {
                return SessionEnd::Lost(err);
            }
            if ready.readable {
                if let Err(err) = self.read(stream) {
                    return SessionEnd::Lost(err);
                }
            }
            if let Err(err) = self.write(stream) {
                return SessionEnd::Lost(err);
            }

            if let Acquire::Listen(endpoint) = &self.acquire {
                match endpoint.try_accept() {
                    Ok(Some(replacement)) => return SessionEnd::Replaced(replacement),
                    Ok(None) => {}
                    Err(err) => debug!(error = %err, "accept while connected failed"),
                }
            }
        }
    }

    /// Heartbeat bookkeeping: fail a silent peer, queue a heartbeat when idle.
    fn keep_alive(&mut self, now: Instant) -> Result<()> {
        if self.heartbeat.is_expired(now) {
            return Err(PeerError::HeartbeatTimeout(self.heartbeat.timeout()));
        }
        if self.heartbeat.should_send(now) {
            let mut outbound = self.shared.outbound();
            // Anything already queued doubles as a liveness signal.
            if outbound.is_empty() {
                outbound.push(HEARTBEAT)?;
                trace!("heartbeat queued");
            }
        }
        Ok(())
    }

    fn read(&mut self, stream: &mut LinkStream) -> Result<()> {
        let received = self.reader.fill_from(stream)?;
        if received > 0 {
            self.heartbeat.record_received(Instant::now());
        }
        loop {
            let frames = self.reader.drain_frames()?;
            if frames.is_empty() {
                return Ok(());
            }
            for payload in frames {
                self.route(payload);
            }
        }
    }

    fn write(&mut self, stream: &mut LinkStream) -> Result<()> {
        let written = {
            let mut outbound = self.shared.outbound();
            if outbound.is_empty() {
                return Ok(());
            }
            outbound.flush_to(stream)?
        };
        if written > 0 {
            self.heartbeat.record_sent(Instant::now());
        }
        Ok(())
    }

    fn route(&mut self, payload: Bytes) {
        if is_heartbeat(&payload) {
            trace!("heartbeat received");
            return;
        }

        if let Some(handler) = self.handler.as_mut() {
            match handler.handle(&payload) {
                Inbound::Reply(reply) => {
                    if let Err(err) = self.shared.outbound().push(&reply) {
                        warn!(error = %err, "could not queue reply");
                    }
                    return;
                }
                Inbound::Consumed => return,
                Inbound::Unhandled => {}
            }
        }

        self.shared.mailbox.deliver(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> LinkConfig {
        LinkConfig {
            poll_interval: Duration::from_millis(10),
            heartbeat_interval: Duration::from_millis(50),
            heartbeat_timeout: Duration::from_millis(500),
            retry_interval: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(200),
            ..LinkConfig::default()
        }
    }

    #[test]
    fn listen_reports_bound_address() {
        let link = Link::listen("127.0.0.1:0", fast_config()).expect("listen should bind");
        let addr = link.local_addr().expect("listen role has an address");
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = LinkConfig {
            heartbeat_timeout: Duration::from_millis(10),
            heartbeat_interval: Duration::from_millis(50),
            ..fast_config()
        };
        let err = Link::listen("127.0.0.1:0", config).unwrap_err();
        assert!(matches!(err, PeerError::InvalidConfig(_)));
    }

    #[test]
    fn links_connect_and_exchange_payloads() {
        let server = Link::listen("127.0.0.1:0", fast_config()).unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let client = Link::dial(&addr, fast_config()).unwrap();

        assert!(server.wait_connected(Duration::from_secs(5)));
        assert!(client.wait_connected(Duration::from_secs(5)));

        client.send(b"raw payload").unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let received = loop {
            if let Some(payload) = server.handle().mailbox().take_unmatched() {
                break payload;
            }
            assert!(Instant::now() < deadline, "payload never arrived");
            thread::sleep(Duration::from_millis(10));
        };
        assert_eq!(received.as_ref(), b"raw payload");
    }

    #[test]
    fn heartbeats_keep_idle_link_up_and_stay_hidden() {
        let server = Link::listen("127.0.0.1:0", fast_config()).unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let client = Link::dial(&addr, fast_config()).unwrap();
        assert!(client.wait_connected(Duration::from_secs(5)));

        // Several timeout windows with no application traffic.
        thread::sleep(Duration::from_millis(1500));
        assert_eq!(server.state(), LinkState::Connected);
        assert_eq!(client.state(), LinkState::Connected);
        assert_eq!(server.handle().mailbox().unmatched_len(), 0);
        assert_eq!(client.handle().mailbox().unmatched_len(), 0);
    }

    #[test]
    fn stop_is_terminal() {
        let mut link = Link::dial("127.0.0.1:9", fast_config()).unwrap();
        link.stop();
        assert_eq!(link.state(), LinkState::Stopped);
        assert!(matches!(link.send(b"late"), Err(PeerError::Stopped)));
        assert!(!link.wait_connected(Duration::from_millis(10)));
    }

    #[test]
    fn send_while_disconnected_is_queued() {
        let link = Link::dial("127.0.0.1:9", fast_config()).unwrap();
        link.send(b"held").unwrap();
        assert!(link.handle().queued_bytes() > 0);
    }
}
