//! Self-healing control link between the camera process and the web process.
//!
//! A [`Link`] keeps exactly one connection alive: it reconnects after errors,
//! sends heartbeats while idle and drops peers that go silent. On top of it:
//! - [`Correlator`] pairs requests with responses by correlation ID
//! - [`CameraServer`] is the web side, exposing recorder calls as methods
//! - [`CameraClient`] is the camera side, dispatching requests to a [`Recorder`]

pub mod client;
pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod link;
mod mailbox;
pub mod recorder;
pub mod request;
pub mod server;

pub use client::CameraClient;
pub use config::{LinkConfig, UnroutablePolicy};
pub use correlator::{Correlator, Ticket};
pub use dispatch::Dispatcher;
pub use error::{PeerError, Result};
pub use link::{Inbound, InboundHandler, Link, LinkHandle, LinkState, Role};
pub use recorder::{Recorder, RecorderError, Segment};
pub use request::{parse_reply, Request, RequestKind, ValueReply};
pub use server::CameraServer;
