use std::net::SocketAddr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::LinkConfig;
use crate::correlator::Correlator;
use crate::error::{PeerError, Result};
use crate::link::{Link, LinkState, Role};
use crate::recorder::Segment;
use crate::request::{parse_reply, Request, SegmentReply};

/// The web-facing side: listens for the camera process and calls into it.
///
/// Each call sends one request and waits for its response under the
/// configured deadline. A timeout is an ordinary error: the remote action may
/// or may not have happened.
#[derive(Debug)]
pub struct CameraServer {
    link: Link,
    correlator: Correlator,
    request_timeout: Duration,
}

impl CameraServer {
    /// Bind `addr` and start accepting the camera process.
    pub fn bind(addr: &str, config: LinkConfig) -> Result<Self> {
        let request_timeout = config.request_timeout;
        let link = Link::spawn(Role::Listen(addr.to_string()), config, None)?;
        let correlator = Correlator::new(link.handle());
        Ok(Self {
            link,
            correlator,
            request_timeout,
        })
    }

    pub fn is_recording(&self) -> Result<bool> {
        self.call(&Request::IsRecording)
    }

    pub fn start_recording(&self) -> Result<bool> {
        self.call(&Request::StartRecording)
    }

    pub fn stop_recording(&self) -> Result<bool> {
        self.call(&Request::StopRecording)
    }

    /// Current frame as base64 in `format`, or `None` when the camera has none.
    pub fn current_frame_base64(&self, format: &str) -> Result<Option<String>> {
        self.call(&Request::CurrentFrameBase64 {
            format: format.to_string(),
        })
    }

    /// Newest recording segment, or `None` when there is none or it is
    /// `last_received`.
    pub fn segment(&self, last_received: Option<&str>) -> Result<Option<Segment>> {
        let reply: Option<SegmentReply> = self.call(&Request::Segment {
            last_received: last_received.map(str::to_string),
        })?;

        reply
            .map(|reply| {
                let data = BASE64.decode(reply.data.as_bytes()).map_err(|err| {
                    PeerError::MalformedResponse(format!("segment data is not base64: {err}"))
                })?;
                Ok(Segment {
                    name: reply.name,
                    data,
                })
            })
            .transpose()
    }

    /// Send `request` and decode the value of its response.
    pub fn call<T: DeserializeOwned>(&self, request: &Request) -> Result<T> {
        debug!(request = request.kind().name(), state = %self.link.state(), "calling camera");
        let body = self
            .correlator
            .request(&request.to_json()?, self.request_timeout)?;
        parse_reply(&body)
    }

    /// Deadline applied to each call.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = timeout;
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.link.local_addr()
    }

    pub fn state(&self) -> LinkState {
        self.link.state()
    }

    /// Wait until the camera process is connected.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        self.link.wait_connected(timeout)
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Stop the link and close the listening socket.
    pub fn stop(&mut self) {
        self.link.stop();
    }
}
