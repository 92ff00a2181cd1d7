//! HTTP surface: health probe and the Twilio voice webhook that points the
//! provider at the media WebSocket.

use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Liveness probe.
pub async fn healthz() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

/// Twilio posts here when a call comes in. The TwiML reply greets the caller
/// and connects the call's media stream to our `/media` WebSocket.
pub async fn voice_webhook(State(state): State<Arc<AppState>>) -> Response {
    info!("inbound voice call, answering with media stream");
    let twiml = voice_twiml(&state.config.salon.name, &state.config.public_base_url);
    ([(header::CONTENT_TYPE, "text/xml")], twiml).into_response()
}

fn voice_twiml(salon_name: &str, public_base_url: &str) -> String {
    let stream_url = format!("{}/media", websocket_base(public_base_url));
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say voice="Polly.Joanna">Thank you for calling {}! This call may be recorded. How can I help you today?</Say>
  <Connect>
    <Stream url="{}"/>
  </Connect>
</Response>"#,
        xml_escape(salon_name),
        xml_escape(&stream_url),
    )
}

/// Twilio requires a ws/wss scheme for `<Stream>` URLs.
fn websocket_base(public_base_url: &str) -> String {
    if let Some(rest) = public_base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = public_base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        public_base_url.to_string()
    }
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
