//! Axum Router Configuration
//!
//! The whole HTTP surface of the bridge: a health probe, the Twilio voice
//! webhook, and the media-stream WebSocket upgrade.

use crate::{handlers, media, state::AppState};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/voice", post(handlers::voice_webhook))
        .route("/media", get(media::media_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
