//! Shared Application State
//!
//! One `AppState` is constructed at startup and shared read-only by every
//! concurrent call. Collaborators are injected here; nothing reaches them
//! through module-level globals.

use crate::config::{Config, SettingsProvider};
use crate::media::SessionFactory;
use crate::tools::ToolDispatcher;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub settings: Arc<dyn SettingsProvider>,
    pub sessions: Arc<dyn SessionFactory>,
    pub dispatcher: Arc<ToolDispatcher>,
}
