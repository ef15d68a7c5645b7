use std::time::Duration;

use crate::config::LinkConfig;
use crate::correlator::Correlator;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::link::{Link, LinkState, Role};
use crate::recorder::Recorder;

/// The camera side: dials the web process and serves its requests.
///
/// Inbound requests are dispatched to the recorder on the link worker
/// thread, one at a time. Replies reuse the request's correlation ID.
#[derive(Debug)]
pub struct CameraClient {
    link: Link,
}

impl CameraClient {
    /// Dial `addr` (retrying until reachable) and serve `recorder`.
    pub fn connect<R: Recorder>(addr: &str, recorder: R, config: LinkConfig) -> Result<Self> {
        let dispatcher = Dispatcher::new(recorder, config.unroutable)?;
        let link = Link::spawn(Role::Dial(addr.to_string()), config, Some(Box::new(dispatcher)))?;
        Ok(Self { link })
    }

    pub fn state(&self) -> LinkState {
        self.link.state()
    }

    pub fn wait_connected(&self, timeout: Duration) -> bool {
        self.link.wait_connected(timeout)
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    /// Correlator over this link, for requests initiated by the camera side
    /// and for reading messages that were not requests.
    pub fn correlator(&self) -> Correlator {
        Correlator::new(self.link.handle())
    }

    pub fn stop(&mut self) {
        self.link.stop();
    }
}
