use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::poll::{wait_for, Interest};
use crate::stream::LinkStream;

/// A listening TCP endpoint for the server role.
///
/// The listener is non-blocking; [`TcpEndpoint::accept_timeout`] waits a
/// bounded time so an accept loop can observe a stop flag between attempts.
/// The listening socket is closed when the endpoint is dropped.
pub struct TcpEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpEndpoint {
    /// Bind and listen on `addr` (`host:port`; port 0 picks a free port).
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, "listening for camera link");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait up to `timeout` for a peer and accept it.
    ///
    /// Returns `Ok(None)` when nobody connected in time.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Option<LinkStream>> {
        let ready = wait_for(&self.listener, Interest::READ, timeout)?;
        if !ready.readable {
            return Ok(None);
        }
        self.try_accept()
    }

    /// Accept a peer if one is already waiting (never blocks).
    pub fn try_accept(&self) -> Result<Option<LinkStream>> {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                debug!(%addr, "accepted connection");
                LinkStream::from_tcp(stream).map(Some)
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(None),
            Err(err) => Err(TransportError::Accept(err)),
        }
    }
}

impl std::fmt::Debug for TcpEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpEndpoint")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// Connect to a listening endpoint, trying each resolved address in turn.
///
/// Each attempt is bounded by `timeout`. The returned stream is non-blocking.
pub fn dial(addr: &str, timeout: Duration) -> Result<LinkStream> {
    let candidates: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?
        .collect();
    if candidates.is_empty() {
        return Err(TransportError::Resolve(addr.to_string()));
    }

    let mut last_err = None;
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => {
                debug!(addr = %candidate, "connected");
                return LinkStream::from_tcp(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(TransportError::Connect {
        addr: addr.to_string(),
        source: last_err.unwrap_or_else(|| std::io::Error::other("no address could be dialed")),
    })
}
