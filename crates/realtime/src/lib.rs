//! Client library for a realtime speech-to-speech model session.
//!
//! [`session::connect`] opens one WebSocket connection to the model provider
//! for the duration of one phone call. The caller talks to it through a
//! command channel (audio appends, commits, close) and receives decoded model
//! events (audio deltas, lifecycle changes) on an event channel. Tool-call
//! events never surface to the caller: they are dispatched through the
//! [`session::ToolHandler`] registered at connect time and the result is
//! written back to the model from inside the session task.

pub mod event;
pub mod session;

pub use event::{ServerEvent, ToolCallEvent, ToolSpec, TurnDetection};
pub use session::{
    SessionCommand, SessionConfig, SessionEvent, SessionHandle, ToolHandler, connect,
};
