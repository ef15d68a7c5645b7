//! Request and response vocabulary carried in envelope bodies.
//!
//! Requests are JSON objects tagged by a `request` field. Successful
//! responses wrap their result as `{"value": ...}`; failures are
//! `{"error": "<message>"}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{PeerError, Result};

/// JSON field naming the request.
pub const REQUEST_KEY: &str = "request";

/// Every request this protocol knows, without its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    IsRecording,
    StartRecording,
    StopRecording,
    CurrentFrameBase64,
    Segment,
}

impl RequestKind {
    pub const ALL: [RequestKind; 5] = [
        RequestKind::IsRecording,
        RequestKind::StartRecording,
        RequestKind::StopRecording,
        RequestKind::CurrentFrameBase64,
        RequestKind::Segment,
    ];

    /// Wire name, as found in the `request` field.
    pub fn name(self) -> &'static str {
        match self {
            RequestKind::IsRecording => "is_recording",
            RequestKind::StartRecording => "start_recording",
            RequestKind::StopRecording => "stop_recording",
            RequestKind::CurrentFrameBase64 => "current_frame_base64",
            RequestKind::Segment => "segment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request")]
pub enum Request {
    #[serde(rename = "is_recording")]
    IsRecording,
    #[serde(rename = "start_recording")]
    StartRecording,
    #[serde(rename = "stop_recording")]
    StopRecording,
    /// `format` is an image extension such as `jpg` or `.png`.
    #[serde(rename = "current_frame_base64")]
    CurrentFrameBase64 { format: String },
    /// Newest recording segment, unless it is the one named `last_received`.
    #[serde(rename = "segment")]
    Segment {
        #[serde(default)]
        last_received: Option<String>,
    },
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::IsRecording => RequestKind::IsRecording,
            Request::StartRecording => RequestKind::StartRecording,
            Request::StopRecording => RequestKind::StopRecording,
            Request::CurrentFrameBase64 { .. } => RequestKind::CurrentFrameBase64,
            Request::Segment { .. } => RequestKind::Segment,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Into::into)
    }
}

/// Successful response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueReply<T> {
    pub value: T,
}

/// Failed response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

/// Segment as carried in a `segment` response; `data` is base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentReply {
    pub name: String,
    pub data: String,
}

/// Decode a response body into the value it wraps.
///
/// An `{"error": ...}` body becomes [`PeerError::Remote`].
pub fn parse_reply<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let mut reply: serde_json::Value = serde_json::from_slice(body)?;
    let Some(object) = reply.as_object_mut() else {
        return Err(PeerError::MalformedResponse(
            "response is not a JSON object".to_string(),
        ));
    };

    if let Some(error) = object.get("error") {
        let message = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(PeerError::Remote(message));
    }

    match object.remove("value") {
        Some(value) => serde_json::from_value(value).map_err(Into::into),
        None => Err(PeerError::MalformedResponse(
            "response has neither value nor error".to_string(),
        )),
    }
}
