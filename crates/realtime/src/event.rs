//! Wire-level message types for the realtime model session.
//!
//! Both directions are closed tagged unions: every JSON frame carries a
//! `type` discriminator and maps to exactly one variant. Inbound frames with
//! a type we do not handle deserialize into [`ServerEvent::Unknown`] and are
//! ignored rather than treated as errors, so provider-side protocol additions
//! never break a live call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Static declaration of one callable tool, announced once at session
/// negotiation. The set of specs is configuration, not per-call state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema,
        }
    }
}

/// Audio format declaration used in session negotiation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioFormat {
    #[serde(rename = "type")]
    pub format: String,
    pub sample_rate: u32,
}

impl AudioFormat {
    pub fn pcm16(sample_rate: u32) -> Self {
        Self {
            format: "pcm16".to_string(),
            sample_rate,
        }
    }
}

/// Turn-detection mode: server-side voice activity detection, or none
/// (explicit commits only).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad,
    None,
}

/// Fields of a `session.update` payload. All optional so the same type
/// serves both initial negotiation and later patches (e.g. keepalives).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<AudioFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<AudioFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepalive_at: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseParams {
    pub modalities: Vec<String>,
}

impl Default for ResponseParams {
    fn default() -> Self {
        Self {
            modalities: vec!["text".to_string(), "audio".to_string()],
        }
    }
}

/// Messages sent from us to the model provider.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionPatch },
    /// One chunk of base64 linear PCM16 caller audio.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseParams },
    /// Result of a dispatched tool call, correlated by the original call id.
    #[serde(rename = "tool.output")]
    ToolOutput { tool_call_id: String, output: String },
}

/// A tool-call request emitted by the model. The provider has used both
/// `id`/`name` and `tool_call_id`/`tool_name` field spellings, and sends
/// `arguments` either as a JSON string or an inline object.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ToolCallEvent {
    #[serde(default, alias = "tool_call_id")]
    pub id: Option<String>,
    #[serde(default, alias = "tool_name")]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCallEvent {
    /// Arguments as a JSON object, tolerating the string-encoded form.
    /// Anything unparseable collapses to an empty object.
    pub fn args_object(&self) -> Value {
        let parsed = match &self.arguments {
            Value::String(raw) => serde_json::from_str(raw).unwrap_or(Value::Null),
            other => other.clone(),
        };
        match parsed {
            Value::Object(_) => parsed,
            _ => Value::Object(Default::default()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
}

/// Messages received from the model provider.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// One chunk of base64 linear PCM16 model audio.
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },
    #[serde(rename = "response.function_call", alias = "tool.call")]
    ToolCall(ToolCallEvent),
    #[serde(rename = "response.completed")]
    ResponseCompleted,
    #[serde(rename = "error")]
    Error { error: ErrorBody },
    /// Any event type we do not model. Ignored, never an error.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_update_wire_shape() {
        let event = ClientEvent::SessionUpdate {
            session: SessionPatch {
                input_audio_format: Some(AudioFormat::pcm16(16000)),
                output_audio_format: Some(AudioFormat::pcm16(16000)),
                turn_detection: Some(TurnDetection::ServerVad),
                voice: Some("alloy".to_string()),
                tools: Some(vec![ToolSpec::new(
                    "getSalonHours",
                    "Get business hours",
                    json!({"type": "object", "properties": {}}),
                )]),
                instructions: Some("You are a receptionist.".to_string()),
                keepalive_at: None,
            },
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["input_audio_format"]["type"], "pcm16");
        assert_eq!(value["session"]["input_audio_format"]["sample_rate"], 16000);
        assert_eq!(value["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(value["session"]["voice"], "alloy");
        assert_eq!(value["session"]["tools"][0]["name"], "getSalonHours");
        // Unset fields must be absent, not null.
        assert!(value["session"].get("keepalive_at").is_none());
    }

    #[test]
    fn append_commit_and_respond_wire_shapes() {
        let append = serde_json::to_value(ClientEvent::InputAudioBufferAppend {
            audio: "AAAA".to_string(),
        })
        .unwrap();
        assert_eq!(append["type"], "input_audio_buffer.append");
        assert_eq!(append["audio"], "AAAA");

        let commit = serde_json::to_value(ClientEvent::InputAudioBufferCommit).unwrap();
        assert_eq!(commit, json!({"type": "input_audio_buffer.commit"}));

        let respond = serde_json::to_value(ClientEvent::ResponseCreate {
            response: ResponseParams::default(),
        })
        .unwrap();
        assert_eq!(respond["type"], "response.create");
        assert_eq!(respond["response"]["modalities"], json!(["text", "audio"]));
    }

    #[test]
    fn tool_output_is_tagged_with_call_id() {
        let value = serde_json::to_value(ClientEvent::ToolOutput {
            tool_call_id: "c1".to_string(),
            output: r#"{"ok":true}"#.to_string(),
        })
        .unwrap();
        assert_eq!(value["type"], "tool.output");
        assert_eq!(value["tool_call_id"], "c1");
        assert_eq!(value["output"], r#"{"ok":true}"#);
    }

    #[test]
    fn audio_delta_deserializes() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"response.audio.delta","delta":"AAAA"}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::AudioDelta {
                delta: "AAAA".to_string()
            }
        );
    }

    #[test]
    fn tool_call_accepts_both_field_spellings() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"response.function_call","id":"c1","name":"getSalonHours","arguments":"{}"}"#,
        )
        .unwrap();
        let ServerEvent::ToolCall(call) = event else {
            panic!("expected tool call");
        };
        assert_eq!(call.id.as_deref(), Some("c1"));
        assert_eq!(call.name.as_deref(), Some("getSalonHours"));

        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"tool.call","tool_call_id":"c2","tool_name":"answerQuestion","arguments":{"question":"hours?"}}"#,
        )
        .unwrap();
        let ServerEvent::ToolCall(call) = event else {
            panic!("expected tool call");
        };
        assert_eq!(call.id.as_deref(), Some("c2"));
        assert_eq!(call.name.as_deref(), Some("answerQuestion"));
        assert_eq!(call.args_object()["question"], "hours?");
    }

    #[test]
    fn args_object_tolerates_garbage() {
        let call = ToolCallEvent {
            arguments: Value::String("not json".to_string()),
            ..Default::default()
        };
        assert_eq!(call.args_object(), json!({}));

        let call = ToolCallEvent {
            arguments: Value::Null,
            ..Default::default()
        };
        assert_eq!(call.args_object(), json!({}));
    }

    #[test]
    fn unrecognized_types_are_ignored_not_errors() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"response.output_text.delta","delta":"hi"}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);

        let event: ServerEvent = serde_json::from_str(r#"{"type":"rate_limits.updated"}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn error_event_carries_message() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"error","error":{"message":"bad session"}}"#).unwrap();
        let ServerEvent::Error { error } = event else {
            panic!("expected error event");
        };
        assert_eq!(error.message, "bad session");
    }
}
