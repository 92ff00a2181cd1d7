//! Connection lifecycle and event routing for one model session.
//!
//! The session lives as a spawned task owning the provider WebSocket. The
//! call bridge drives it through [`SessionHandle`] and consumes decoded
//! [`SessionEvent`]s; tool calls are serviced internally via the registered
//! [`ToolHandler`] so a slow capability never stalls the audio path.

use crate::event::{
    AudioFormat, ClientEvent, ResponseParams, ServerEvent, SessionPatch, ToolSpec, TurnDetection,
};
use anyhow::{Context, Result};
use base64::Engine;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

const REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default auto-flush threshold: ~1s of 16 kHz mono PCM16.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 32_000;

/// Default keepalive cadence while the session is active.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(20);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Everything needed to negotiate one session. Voice, instructions and
/// thresholds are owned by the caller's configuration layer; this crate only
/// carries them onto the wire.
#[derive(Clone)]
pub struct SessionConfig {
    pub model: String,
    pub api_key: SecretString,
    pub voice: String,
    pub instructions: String,
    pub tools: Vec<ToolSpec>,
    pub turn_detection: TurnDetection,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub flush_threshold_bytes: usize,
    pub keepalive: Duration,
}

impl SessionConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            model: "gpt-4o-realtime-preview".to_string(),
            api_key,
            voice: "alloy".to_string(),
            instructions: String::new(),
            tools: Vec::new(),
            turn_detection: TurnDetection::ServerVad,
            input_sample_rate: 16_000,
            output_sample_rate: 16_000,
            flush_threshold_bytes: DEFAULT_FLUSH_THRESHOLD,
            keepalive: DEFAULT_KEEPALIVE,
        }
    }
}

/// Commands accepted by a running session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Raw linear PCM16 bytes at the negotiated input rate.
    AppendAudio(Bytes),
    /// Force a model turn regardless of accumulated bytes (caller hung up).
    CommitAndRespond,
    Close,
}

/// Events surfaced to the call bridge.
#[derive(Debug, PartialEq)]
pub enum SessionEvent {
    Opened,
    /// Decoded linear PCM16 bytes at the negotiated output rate.
    Audio(Vec<u8>),
    Error(String),
    Closed,
}

/// Services a tool-call event. Implementations must never fail: any internal
/// error is encoded into the returned JSON value.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, name: &str, args: Value) -> Value;
}

/// Cloneable sender half used to drive a session task. All sends are silent
/// no-ops once the task has exited.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn new(commands: mpsc::Sender<SessionCommand>) -> Self {
        Self { commands }
    }

    pub async fn append_audio(&self, pcm: Bytes) {
        let _ = self.commands.send(SessionCommand::AppendAudio(pcm)).await;
    }

    pub async fn commit_and_respond(&self) {
        let _ = self.commands.send(SessionCommand::CommitAndRespond).await;
    }

    pub async fn close(&self) {
        let _ = self.commands.send(SessionCommand::Close).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Connecting,
    SessionConfigured,
    Active,
    Closing,
    Closed,
}

/// Tracks unflushed appended bytes so continuous speech still gets a model
/// turn within a bounded latency window.
#[derive(Debug)]
pub(crate) struct FlushGauge {
    pending: usize,
    threshold: usize,
}

impl FlushGauge {
    pub(crate) fn new(threshold: usize) -> Self {
        Self {
            pending: 0,
            threshold,
        }
    }

    pub(crate) fn record(&mut self, bytes: usize) {
        self.pending += bytes;
    }

    pub(crate) fn should_flush(&self) -> bool {
        self.pending >= self.threshold
    }

    pub(crate) fn reset(&mut self) {
        self.pending = 0;
    }
}

/// Opens the provider WebSocket, negotiates the session, and spawns the
/// session task.
///
/// Connection or negotiation failure here is fatal to the call being set up;
/// everything after this point degrades per-message instead.
pub async fn connect(
    config: SessionConfig,
    tools: Arc<dyn ToolHandler>,
) -> Result<(SessionHandle, mpsc::Receiver<SessionEvent>)> {
    let state = SessionState::Connecting;
    debug!(?state, model = %config.model, "opening realtime session");
    let url = format!("{REALTIME_URL}?model={}", config.model);
    let mut request = url.into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", config.api_key.expose_secret()).parse()?,
    );
    request
        .headers_mut()
        .insert("OpenAI-Beta", "realtime=v1".parse()?);

    let (ws_stream, _) = connect_async(request)
        .await
        .context("failed to connect to realtime model endpoint")?;
    let (mut ws_tx, ws_rx) = ws_stream.split();
    info!(model = %config.model, "realtime session connected");

    let negotiation = ClientEvent::SessionUpdate {
        session: SessionPatch {
            input_audio_format: Some(AudioFormat::pcm16(config.input_sample_rate)),
            output_audio_format: Some(AudioFormat::pcm16(config.output_sample_rate)),
            turn_detection: Some(config.turn_detection),
            voice: Some(config.voice.clone()),
            tools: Some(config.tools.clone()),
            instructions: Some(config.instructions.clone()),
            ..Default::default()
        },
    };
    send_event(&mut ws_tx, &negotiation)
        .await
        .context("failed to send session negotiation")?;
    let state = SessionState::SessionConfigured;
    debug!(?state, "session negotiated");

    let (command_tx, command_rx) = mpsc::channel(128);
    let (event_tx, event_rx) = mpsc::channel(256);
    tokio::spawn(run_session(
        ws_tx, ws_rx, command_rx, event_tx, tools, config,
    ));

    Ok((SessionHandle::new(command_tx), event_rx))
}

async fn run_session(
    mut ws_tx: WsSink,
    mut ws_rx: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    mut commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::Sender<SessionEvent>,
    tools: Arc<dyn ToolHandler>,
    config: SessionConfig,
) {
    let mut state = SessionState::Active;
    debug!(?state, "session task running");
    let _ = events.send(SessionEvent::Opened).await;

    // Tool outputs come back from spawned dispatch tasks on this channel so
    // the read loop is never blocked on a capability.
    let (wire_tx, mut wire_rx) = mpsc::channel::<ClientEvent>(64);
    let mut gauge = FlushGauge::new(config.flush_threshold_bytes);
    let mut keepalive = tokio::time::interval_at(
        tokio::time::Instant::now() + config.keepalive,
        config.keepalive,
    );
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(SessionCommand::AppendAudio(pcm)) => {
                    gauge.record(pcm.len());
                    let audio = base64::engine::general_purpose::STANDARD.encode(&pcm);
                    if send_event(&mut ws_tx, &ClientEvent::InputAudioBufferAppend { audio }).await.is_err() {
                        break;
                    }
                    if gauge.should_flush() {
                        debug!("auto-flush threshold reached, committing turn");
                        if commit_and_respond(&mut ws_tx).await.is_err() {
                            break;
                        }
                        gauge.reset();
                    }
                }
                Some(SessionCommand::CommitAndRespond) => {
                    if commit_and_respond(&mut ws_tx).await.is_err() {
                        break;
                    }
                    gauge.reset();
                }
                Some(SessionCommand::Close) | None => break,
            },
            Some(out) = wire_rx.recv() => {
                if send_event(&mut ws_tx, &out).await.is_err() {
                    break;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    route_server_event(text.as_str(), &events, &tools, &wire_tx).await;
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "realtime socket error");
                    break;
                }
            },
            // Heartbeat while active, to surface silently-dead connections
            // before the provider times the socket out.
            _ = keepalive.tick() => {
                let heartbeat = ClientEvent::SessionUpdate {
                    session: SessionPatch {
                        keepalive_at: Some(epoch_millis()),
                        ..Default::default()
                    },
                };
                if send_event(&mut ws_tx, &heartbeat).await.is_err() {
                    break;
                }
            },
        }
    }

    state = SessionState::Closing;
    debug!(?state, "closing realtime session");
    let _ = ws_tx.send(WsMessage::Close(None)).await;
    state = SessionState::Closed;
    debug!(?state, "realtime session finished");
    let _ = events.send(SessionEvent::Closed).await;
}

/// Decodes one inbound frame and routes it. Malformed JSON is logged and
/// skipped; the session continues.
async fn route_server_event(
    text: &str,
    events: &mpsc::Sender<SessionEvent>,
    tools: &Arc<dyn ToolHandler>,
    wire_tx: &mpsc::Sender<ClientEvent>,
) {
    let event = match serde_json::from_str::<ServerEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "skipping malformed realtime event");
            return;
        }
    };

    match event {
        ServerEvent::AudioDelta { delta } => {
            match base64::engine::general_purpose::STANDARD.decode(&delta) {
                Ok(pcm) => {
                    let _ = events.send(SessionEvent::Audio(pcm)).await;
                }
                Err(err) => warn!(error = %err, "dropping undecodable audio delta"),
            }
        }
        ServerEvent::ToolCall(call) => {
            let Some(call_id) = call.id.clone() else {
                warn!("tool call without a correlation id, skipping");
                return;
            };
            let name = call.name.clone();
            let args = call.args_object();
            let tools = tools.clone();
            let wire_tx = wire_tx.clone();
            // Dispatched off the read loop; a result arriving after close is
            // discarded when the wire channel is gone.
            tokio::spawn(async move {
                let output = match name.as_deref() {
                    Some(name) => tools.handle(name, args).await,
                    None => json!({"ok": false, "error": "no tool name provided"}),
                };
                let output = serde_json::to_string(&output)
                    .unwrap_or_else(|_| r#"{"ok":false,"error":"unserializable tool output"}"#.to_string());
                let _ = wire_tx
                    .send(ClientEvent::ToolOutput {
                        tool_call_id: call_id,
                        output,
                    })
                    .await;
            });
        }
        ServerEvent::Error { error } => {
            warn!(message = %error.message, "realtime session reported an error");
            let _ = events.send(SessionEvent::Error(error.message)).await;
        }
        ServerEvent::ResponseCompleted | ServerEvent::Unknown => {}
    }
}

async fn send_event(ws_tx: &mut WsSink, event: &ClientEvent) -> Result<()> {
    let serialized = serde_json::to_string(event)?;
    ws_tx.send(WsMessage::Text(serialized.into())).await?;
    Ok(())
}

async fn commit_and_respond(ws_tx: &mut WsSink) -> Result<()> {
    send_event(ws_tx, &ClientEvent::InputAudioBufferCommit).await?;
    send_event(
        ws_tx,
        &ClientEvent::ResponseCreate {
            response: ResponseParams::default(),
        },
    )
    .await
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTools;

    #[async_trait::async_trait]
    impl ToolHandler for EchoTools {
        async fn handle(&self, name: &str, args: Value) -> Value {
            json!({"ok": true, "tool": name, "args": args})
        }
    }

    async fn route(text: &str) -> (mpsc::Receiver<SessionEvent>, mpsc::Receiver<ClientEvent>) {
        let (event_tx, event_rx) = mpsc::channel(8);
        let (wire_tx, wire_rx) = mpsc::channel(8);
        let tools: Arc<dyn ToolHandler> = Arc::new(EchoTools);
        route_server_event(text, &event_tx, &tools, &wire_tx).await;
        (event_rx, wire_rx)
    }

    #[tokio::test]
    async fn tool_call_produces_exactly_one_correlated_output() {
        let (_events, mut wire_rx) = route(
            r#"{"type":"response.function_call","id":"c1","name":"getSalonHours","arguments":"{}"}"#,
        )
        .await;

        let out = wire_rx.recv().await.expect("tool output sent");
        let ClientEvent::ToolOutput {
            tool_call_id,
            output,
        } = out
        else {
            panic!("expected tool output, got {out:?}");
        };
        assert_eq!(tool_call_id, "c1");
        let output: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(output["ok"], true);
        assert_eq!(output["tool"], "getSalonHours");

        // Exactly one: the dispatch task has finished, nothing else queued.
        assert!(wire_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn tool_call_without_an_id_is_skipped() {
        let (_events, mut wire_rx) =
            route(r#"{"type":"tool.call","tool_name":"getSalonHours","arguments":"{}"}"#).await;
        assert!(wire_rx.recv().await.is_none() || wire_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn audio_deltas_are_decoded_and_forwarded() {
        let (mut events, _wire) =
            route(r#"{"type":"response.audio.delta","delta":"AAAB"}"#).await;
        match events.recv().await {
            Some(SessionEvent::Audio(pcm)) => assert_eq!(pcm.len(), 3),
            other => panic!("expected audio event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_and_unknown_messages_are_no_ops() {
        let (mut events, mut wire_rx) = route("not json at all").await;
        assert!(events.try_recv().is_err());
        assert!(wire_rx.try_recv().is_err());

        let (mut events, _wire) = route(r#"{"type":"rate_limits.updated"}"#).await;
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn flush_gauge_fires_exactly_once_at_threshold() {
        let mut gauge = FlushGauge::new(32_000);
        let mut flushes = 0;

        // 640-byte frames: 20ms of 16kHz PCM16. 50 frames cross the line.
        for _ in 0..60 {
            gauge.record(640);
            if gauge.should_flush() {
                flushes += 1;
                gauge.reset();
            }
        }

        assert_eq!(flushes, 1);
        // 60 * 640 - 32000 = 6400 bytes accumulated since the flush.
        assert!(!gauge.should_flush());
    }

    #[test]
    fn flush_gauge_resets_to_zero() {
        let mut gauge = FlushGauge::new(100);
        gauge.record(100);
        assert!(gauge.should_flush());
        gauge.reset();
        gauge.record(99);
        assert!(!gauge.should_flush());
        gauge.record(1);
        assert!(gauge.should_flush());
    }

    #[test]
    fn session_config_defaults_match_contract() {
        let config = SessionConfig::new(SecretString::from("test-key"));
        assert_eq!(config.input_sample_rate, 16_000);
        assert_eq!(config.output_sample_rate, 16_000);
        assert_eq!(config.flush_threshold_bytes, 32_000);
        assert_eq!(config.keepalive, Duration::from_secs(20));
        assert_eq!(config.turn_detection, TurnDetection::ServerVad);
        assert_eq!(config.voice, "alloy");
    }
}
