//! Outbound half of the telephony connection.
//!
//! [`MediaChannel`] owns the lifecycle state machine for one media stream and
//! gates audio sends on it: audio only flows while the stream is started or
//! streaming, and anything sent after stop or close is dropped, not queued.

use super::protocol::outbound_media;
use crate::audio;
use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Started,
    Streaming,
    Stopped,
    Closed,
}

/// Outbound audio sink for one telephony media stream. Frames are handed to
/// a writer task through a bounded channel; a full or closed writer means the
/// frame is dropped and the call carries on.
pub struct MediaChannel {
    outbound: mpsc::Sender<Message>,
    stream_sid: Option<String>,
    state: ChannelState,
}

impl MediaChannel {
    pub fn new(outbound: mpsc::Sender<Message>) -> Self {
        Self {
            outbound,
            stream_sid: None,
            state: ChannelState::Idle,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    /// Records the stream identity from the provider's `start` frame.
    pub fn start(&mut self, stream_sid: String) {
        debug!(%stream_sid, "media stream started");
        self.stream_sid = Some(stream_sid);
        self.state = ChannelState::Started;
    }

    /// First media frame observed; the stream is live in both directions.
    pub fn note_streaming(&mut self) {
        if self.state == ChannelState::Started {
            self.state = ChannelState::Streaming;
        }
    }

    /// Provider signalled end-of-input. Subsequent sends are dropped.
    pub fn stop(&mut self) {
        if self.state != ChannelState::Closed {
            self.state = ChannelState::Stopped;
        }
    }

    pub fn close(&mut self) {
        self.state = ChannelState::Closed;
    }

    /// Wraps raw μ-law bytes in the outbound media envelope and queues them
    /// for the writer. Valid only while started or streaming; otherwise the
    /// frame is silently dropped.
    pub fn send_audio(&self, mulaw: &[u8]) {
        if !matches!(self.state, ChannelState::Started | ChannelState::Streaming) {
            debug!(state = ?self.state, "dropping outbound audio, stream not live");
            return;
        }
        let Some(stream_sid) = &self.stream_sid else {
            return;
        };
        let envelope = outbound_media(stream_sid, &audio::base64_encode(mulaw));
        if self.outbound.try_send(Message::Text(envelope.into())).is_err() {
            warn!("dropping outbound audio, writer unavailable");
        }
    }
}
