//! Frontdesk API Library Crate
//!
//! Everything behind the phone number: the Twilio webhook and media
//! WebSocket, the audio codec pipeline, the tool dispatcher with its
//! built-in capabilities, and the per-call bridge to the realtime model.
//! The `api` binary is a thin wrapper around this library.

pub mod audio;
pub mod config;
pub mod domain;
pub mod handlers;
pub mod media;
pub mod router;
pub mod state;
pub mod tools;
