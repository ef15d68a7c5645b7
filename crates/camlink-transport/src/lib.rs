//! TCP transport for camlink links.
//!
//! Provides the two ways a link obtains its single connection:
//! - [`TcpEndpoint`] binds, listens and accepts one peer at a time (server role)
//! - [`dial`] connects out to a listening endpoint (client role)
//!
//! Every connected [`LinkStream`] is non-blocking. Callers wait on it with
//! [`LinkStream::wait`], which reports readability and writability the way
//! `poll(2)` does. This is the lowest layer of camlink.

pub mod error;
pub mod poll;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use poll::{Interest, Readiness};
pub use stream::LinkStream;
pub use tcp::{dial, TcpEndpoint};
