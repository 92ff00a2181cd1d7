//! The telephony side of the bridge: Twilio media-stream frame types, the
//! outbound channel state machine, and the per-call orchestrator.

pub mod bridge;
pub mod channel;
pub mod protocol;

pub use bridge::{SessionFactory, media_handler};
pub use channel::MediaChannel;
pub use protocol::TwilioFrame;
