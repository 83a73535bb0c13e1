// ── Session wire frames ──
//
// Every WebSocket text frame exchanged with the hub is one JSON object
// tagged by `type`. Outbound frames are built here; inbound frames are
// parsed into `InboundFrame` by the session reader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_ENCODING_UTF8: &str = "utf-8";

/// A device-to-cloud telemetry message.
///
/// `body` is the JSON object mapping metric names to values. Each message
/// carries a fresh `message_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryMessage {
    pub message_id: Uuid,
    pub content_type: String,
    pub content_encoding: String,
    pub created_at: DateTime<Utc>,
    pub body: serde_json::Value,
}

impl TelemetryMessage {
    /// Wrap a JSON body with a newly generated message id.
    pub fn json(body: serde_json::Value) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            content_type: CONTENT_TYPE_JSON.to_owned(),
            content_encoding: CONTENT_ENCODING_UTF8.to_owned(),
            created_at: Utc::now(),
            body,
        }
    }
}

/// A cloud-to-device method invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MethodRequest {
    pub request_id: String,
    pub method_name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// The device's answer to a [`MethodRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MethodResponse {
    pub request_id: String,
    pub status: u16,
    pub payload: serde_json::Value,
}

impl MethodResponse {
    /// Build a response addressed to the given request.
    pub fn for_request(request: &MethodRequest, status: u16, payload: serde_json::Value) -> Self {
        Self {
            request_id: request.request_id.clone(),
            status,
            payload,
        }
    }
}

/// Frames the device sends.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum OutboundFrame<'a> {
    Telemetry(&'a TelemetryMessage),
    MethodResponse(&'a MethodResponse),
}

/// Frames the device receives.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum InboundFrame {
    MethodRequest(MethodRequest),
    #[serde(other)]
    Unknown,
}
