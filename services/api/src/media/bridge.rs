//! Per-call orchestrator: wires the telephony stream, the audio pipeline and
//! the realtime model session together and guarantees symmetric teardown.
//!
//! Each call runs as one task owning both connections. The two sockets pace
//! themselves independently; the only coupling is the select loop below, and
//! closing either side breaks the loop and closes the other.

use super::channel::MediaChannel;
use super::protocol::TwilioFrame;
use crate::{
    audio,
    config::CallSettings,
    state::AppState,
    tools::{CallContext, CallToolHandler},
};
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use frontdesk_realtime::{SessionConfig, SessionEvent, SessionHandle, ToolHandler, connect};
use futures_util::{SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Opens a realtime model session for one call. Injected so tests can stand
/// in a fake session behind the same seam.
#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        settings: CallSettings,
        tools: Arc<dyn ToolHandler>,
    ) -> Result<(SessionHandle, mpsc::Receiver<SessionEvent>)>;
}

/// Production factory: connects to the OpenAI realtime endpoint with the
/// startup credentials and the per-call settings.
pub struct OpenAiSessionFactory {
    config: Arc<crate::config::Config>,
    specs: Vec<frontdesk_realtime::ToolSpec>,
}

impl OpenAiSessionFactory {
    pub fn new(config: Arc<crate::config::Config>, specs: Vec<frontdesk_realtime::ToolSpec>) -> Self {
        Self { config, specs }
    }
}

#[async_trait::async_trait]
impl SessionFactory for OpenAiSessionFactory {
    async fn open(
        &self,
        settings: CallSettings,
        tools: Arc<dyn ToolHandler>,
    ) -> Result<(SessionHandle, mpsc::Receiver<SessionEvent>)> {
        let mut session = SessionConfig::new(self.config.openai_api_key.clone());
        session.model = self.config.realtime_model.clone();
        session.voice = settings.voice;
        session.instructions = settings.instructions;
        session.tools = self.specs.clone();
        session.flush_threshold_bytes = settings.flush_threshold_bytes;
        session.keepalive = settings.keepalive;
        connect(session, tools).await
    }
}

/// Axum handler upgrading `/media` to the telephony media WebSocket.
pub async fn media_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_media_socket(socket, state))
}

async fn handle_media_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("telephony media stream connected");
    let (mut socket_tx, socket_rx) = socket.split();

    // Writer pump: the call loop queues outbound frames, this task owns the
    // sink. Dropping the sender ends the pump and closes the socket.
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(256);
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if socket_tx.send(msg).await.is_err() {
                break;
            }
        }
        let _ = socket_tx.send(Message::Close(None)).await;
    });

    run_call(state, outbound_tx, socket_rx).await;
    let _ = writer.await;
    info!("telephony media stream finished");
}

/// The per-call event loop. Generic over the inbound frame stream so tests
/// can drive it without a real socket.
#[instrument(name = "media_call", skip_all, fields(stream_sid, call_sid))]
pub(crate) async fn run_call<S>(
    state: Arc<AppState>,
    outbound: mpsc::Sender<Message>,
    mut frames: S,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    let mut channel = MediaChannel::new(outbound);
    let mut session: Option<SessionHandle> = None;
    let mut session_events: Option<mpsc::Receiver<SessionEvent>> = None;

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let frame = match serde_json::from_str::<TwilioFrame>(&text) {
                        Ok(frame) => frame,
                        Err(err) => {
                            warn!(error = %err, "dropping malformed telephony frame");
                            continue;
                        }
                    };
                    match on_telephony_frame(frame, &state, &mut channel, &mut session, &mut session_events).await {
                        Ok(()) => {}
                        Err(err) => {
                            error!(error = %err, "call setup failed");
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("telephony socket closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "telephony socket error");
                    break;
                }
            },
            event = recv_session_event(&mut session_events) => match event {
                Some(SessionEvent::Opened) => debug!("model session opened"),
                Some(SessionEvent::Audio(pcm)) => {
                    // Model audio: linear16 @ 16 kHz -> mulaw @ 8 kHz.
                    let samples = audio::pcm_from_bytes(&pcm);
                    let mulaw = audio::encode_mulaw(&audio::downsample_16k_to_8k(&samples));
                    channel.send_audio(&mulaw);
                }
                Some(SessionEvent::Error(message)) => {
                    warn!(%message, "model session reported an error");
                }
                Some(SessionEvent::Closed) | None => {
                    debug!("model session closed");
                    break;
                }
            },
        }
    }

    // Symmetric teardown: whichever side broke the loop, close the other.
    // Both operations are no-ops when already closed.
    if let Some(handle) = session.take() {
        handle.close().await;
    }
    channel.close();
}

/// Keeps the select loop alive while no session exists yet.
async fn recv_session_event(
    events: &mut Option<mpsc::Receiver<SessionEvent>>,
) -> Option<SessionEvent> {
    match events.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn on_telephony_frame(
    frame: TwilioFrame,
    state: &Arc<AppState>,
    channel: &mut MediaChannel,
    session: &mut Option<SessionHandle>,
    session_events: &mut Option<mpsc::Receiver<SessionEvent>>,
) -> Result<()> {
    match frame {
        TwilioFrame::Connected => debug!("telephony handshake acknowledged"),
        TwilioFrame::Start { start } => {
            tracing::Span::current().record("stream_sid", start.stream_sid.as_str());
            if let Some(call_sid) = &start.call_sid {
                tracing::Span::current().record("call_sid", call_sid.as_str());
            }
            info!("call started");
            channel.start(start.stream_sid);

            // Per-call settings are resolved now so voice or prompt changes
            // take effect without a restart.
            let settings = state.settings.call_settings().await;
            let tools: Arc<dyn ToolHandler> = Arc::new(CallToolHandler::new(
                state.dispatcher.clone(),
                CallContext {
                    call_sid: start.call_sid,
                },
            ));
            let (handle, events) = state.sessions.open(settings, tools).await?;
            *session = Some(handle);
            *session_events = Some(events);
        }
        TwilioFrame::Media { media } => {
            channel.note_streaming();
            let Some(handle) = session.as_ref() else {
                return Ok(());
            };
            // Caller audio: mulaw @ 8 kHz -> linear16 @ 16 kHz. A frame that
            // fails to decode is discarded and the call continues.
            let mulaw = match audio::base64_decode(&media.payload) {
                Ok(mulaw) => mulaw,
                Err(err) => {
                    warn!(error = %err, "dropping undecodable media payload");
                    return Ok(());
                }
            };
            let pcm = audio::upsample_8k_to_16k(&audio::decode_mulaw(&mulaw));
            handle.append_audio(Bytes::from(audio::pcm_to_bytes(&pcm))).await;
        }
        TwilioFrame::Stop => {
            info!("caller hung up, forcing final model turn");
            channel.stop();
            if let Some(handle) = session.as_ref() {
                handle.commit_and_respond().await;
            }
        }
        TwilioFrame::Mark | TwilioFrame::Other => {}
    }
    Ok(())
}
