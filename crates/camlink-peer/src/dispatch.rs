use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use camlink_frame::Envelope;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::UnroutablePolicy;
use crate::error::{PeerError, Result};
use crate::link::{Inbound, InboundHandler};
use crate::recorder::Recorder;
use crate::request::{ErrorReply, Request, RequestKind, SegmentReply, ValueReply, REQUEST_KEY};

/// Outcome of decoding one envelope body.
#[derive(Debug)]
enum Decoded {
    /// Not JSON, or JSON without a request name.
    NotARequest,
    /// Names a request this side has no route for.
    Unroutable(String),
    /// Known request name, but its fields do not fit.
    Invalid(RequestKind, serde_json::Error),
    Request(Request),
}

/// Routes inbound requests to a [`Recorder`] and builds the replies.
///
/// The route table is built and checked once at construction.
pub struct Dispatcher<R> {
    recorder: R,
    routes: HashMap<&'static str, RequestKind>,
    unroutable: UnroutablePolicy,
}

impl<R: Recorder> Dispatcher<R> {
    pub fn new(recorder: R, unroutable: UnroutablePolicy) -> Result<Self> {
        let mut routes = HashMap::with_capacity(RequestKind::ALL.len());
        for kind in RequestKind::ALL {
            if routes.insert(kind.name(), kind).is_some() {
                return Err(PeerError::InvalidConfig(format!(
                    "request name {} routed twice",
                    kind.name()
                )));
            }
        }

        Ok(Self {
            recorder,
            routes,
            unroutable,
        })
    }

    /// The kind routed under `name`, if any.
    pub fn route(&self, name: &str) -> Option<RequestKind> {
        self.routes.get(name).copied()
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut R {
        &mut self.recorder
    }

    /// Run `request` against the recorder and build its `{"value": ...}` body.
    pub fn dispatch(&mut self, request: Request) -> Result<Value> {
        let value = match request {
            Request::IsRecording => value_reply(self.recorder.is_recording())?,
            Request::StartRecording => {
                self.recorder.start_recording()?;
                value_reply(true)?
            }
            Request::StopRecording => {
                self.recorder.stop_recording()?;
                value_reply(true)?
            }
            Request::CurrentFrameBase64 { format } => {
                value_reply(self.recorder.current_frame_base64(&format)?)?
            }
            Request::Segment { last_received } => {
                let segment = self
                    .recorder
                    .latest_segment()?
                    .filter(|segment| last_received.as_deref() != Some(segment.name.as_str()))
                    .map(|segment| SegmentReply {
                        name: segment.name,
                        data: BASE64.encode(&segment.data),
                    });
                value_reply(segment)?
            }
        };
        Ok(value)
    }

    fn decode(&self, body: &[u8]) -> Decoded {
        let Ok(message) = serde_json::from_slice::<Value>(body) else {
            return Decoded::NotARequest;
        };
        let Some(name) = message.get(REQUEST_KEY).and_then(Value::as_str) else {
            return Decoded::NotARequest;
        };
        let Some(kind) = self.route(name) else {
            return Decoded::Unroutable(name.to_string());
        };

        match serde_json::from_value::<Request>(message) {
            Ok(request) => Decoded::Request(request),
            Err(err) => Decoded::Invalid(kind, err),
        }
    }
}

impl<R: Recorder> InboundHandler for Dispatcher<R> {
    fn handle(&mut self, payload: &Bytes) -> Inbound {
        let Ok(envelope) = Envelope::parse(payload.clone()) else {
            return Inbound::Unhandled;
        };

        let reply = match self.decode(&envelope.body) {
            Decoded::NotARequest => return Inbound::Unhandled,
            Decoded::Unroutable(name) => match self.unroutable {
                UnroutablePolicy::Ignore => {
                    warn!(id = %envelope.id, request = %name, "unroutable request ignored");
                    return Inbound::Unhandled;
                }
                UnroutablePolicy::Reply => {
                    warn!(id = %envelope.id, request = %name, "unroutable request rejected");
                    error_reply(PeerError::UnknownRequest(name).to_string())
                }
            },
            Decoded::Invalid(kind, err) => {
                warn!(id = %envelope.id, request = kind.name(), error = %err, "invalid request fields");
                error_reply(format!("invalid {} request: {err}", kind.name()))
            }
            Decoded::Request(request) => {
                let kind = request.kind();
                debug!(id = %envelope.id, request = kind.name(), "dispatching");
                self.dispatch(request).unwrap_or_else(|err| {
                    warn!(id = %envelope.id, request = kind.name(), error = %err, "request failed");
                    error_reply(err.to_string())
                })
            }
        };

        match serde_json::to_vec(&reply) {
            Ok(body) => Inbound::Reply(Envelope::new(envelope.id, body).to_payload()),
            Err(err) => {
                warn!(id = %envelope.id, error = %err, "could not encode reply");
                Inbound::Consumed
            }
        }
    }
}

fn value_reply<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(ValueReply { value }).map_err(Into::into)
}

fn error_reply(error: String) -> Value {
    let reply = ErrorReply { error };
    serde_json::to_value(&reply).unwrap_or_else(|_| serde_json::json!({ "error": reply.error }))
}
