//! Self-healing control link between a camera process and a web process.
//!
//! The web process binds and issues recorder calls; the camera process dials
//! in and answers them. Either side may restart and the link recovers.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP endpoints and readiness waits
//! - [`frame`]: length-prefixed framing and correlation envelopes
//! - [`peer`]: the managed link, request correlation and both roles

/// Re-export transport types.
pub mod transport {
    pub use camlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use camlink_frame::*;
}

/// Re-export link and role types.
pub mod peer {
    pub use camlink_peer::*;
}
