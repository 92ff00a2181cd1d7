//! Wire types for the Twilio media-stream WebSocket.
//!
//! Inbound frames are JSON text tagged by `event`. Unknown events map to
//! [`TwilioFrame::Other`] and are ignored; malformed frames are a per-frame
//! parse error the caller logs and drops, never fatal to the call.

use serde::Deserialize;
use serde_json::json;

/// Identifiers delivered with the `start` frame. `callSid` can lag behind or
/// be absent entirely.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartMeta {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
}

/// One inbound audio chunk: base64 μ-law, 8 kHz mono.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MediaPayload {
    pub payload: String,
}

/// One inbound frame from the telephony provider.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioFrame {
    Connected,
    Start { start: StartMeta },
    Media { media: MediaPayload },
    Stop,
    Mark,
    #[serde(other)]
    Other,
}

/// Builds the outbound media envelope for one μ-law chunk, tagged with the
/// stream it belongs to.
pub fn outbound_media(stream_sid: &str, payload_b64: &str) -> String {
    json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "payload": payload_b64 },
    })
    .to_string()
}
