use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::poll::{wait_for, Interest, Readiness};

/// A connected, non-blocking link stream. Implements `Read` + `Write`.
///
/// Reads and writes never block: they return `ErrorKind::WouldBlock` when the
/// socket is not ready. Use [`LinkStream::wait`] to sleep until it is.
pub struct LinkStream {
    inner: TcpStream,
    peer: SocketAddr,
}

impl LinkStream {
    pub(crate) fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        debug!(%peer, "link stream ready");
        Ok(Self {
            inner: stream,
            peer,
        })
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Address of the local end.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }

    /// Wait up to `timeout` for the stream to become ready.
    ///
    /// Returns an idle [`Readiness`] on timeout and an error on an exceptional
    /// socket condition.
    pub fn wait(&self, interest: Interest, timeout: Duration) -> Result<Readiness> {
        wait_for(&self.inner, interest, timeout)
    }

    /// Shut down both directions. Errors are ignored; the stream is unusable after.
    pub fn shutdown(&self) {
        if let Err(err) = self.inner.shutdown(Shutdown::Both) {
            debug!(peer = %self.peer, error = %err, "shutdown on closed stream");
        }
    }
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStream")
            .field("peer", &self.peer)
            .finish()
    }
}
