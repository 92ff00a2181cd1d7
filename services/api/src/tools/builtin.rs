//! Built-in capabilities shipped with the service.
//!
//! These are thin adapters between the tool protocol and the injected
//! domain collaborators; anything resembling business logic (booking,
//! calendars, KB internals) stays on the other side of the traits in
//! [`crate::domain`].

use super::{Capability, ToolRegistry};
use crate::config::SalonProfile;
use crate::domain::{KnowledgeBase, SmsSender, StaffEvent, StaffNotifier};
use anyhow::{Result, anyhow};
use frontdesk_realtime::ToolSpec;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

fn arg_str(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

/// Answers "when are you open".
pub struct GetSalonHours {
    profile: SalonProfile,
}

#[async_trait::async_trait]
impl Capability for GetSalonHours {
    async fn invoke(&self, _args: Value) -> Result<Value> {
        Ok(json!({
            "ok": true,
            "hours": self.profile.hours,
            "message": format!("We're open {}.", self.profile.hours),
        }))
    }
}

/// Answers "where are you".
pub struct GetSalonLocation {
    profile: SalonProfile,
}

#[async_trait::async_trait]
impl Capability for GetSalonLocation {
    async fn invoke(&self, _args: Value) -> Result<Value> {
        Ok(json!({
            "ok": true,
            "address": self.profile.address,
            "message": format!("We're located at {}.", self.profile.address),
            "offerToText": "Should I text you the location link?",
        }))
    }
}

/// Free-form questions, answered from the knowledge base with a confidence
/// floor: below it the assistant asks the caller to rephrase instead of
/// guessing.
pub struct AnswerQuestion {
    kb: Arc<dyn KnowledgeBase>,
    min_confidence: f64,
}

#[async_trait::async_trait]
impl Capability for AnswerQuestion {
    async fn invoke(&self, args: Value) -> Result<Value> {
        let question =
            arg_str(&args, "question").ok_or_else(|| anyhow!("`question` is required"))?;
        let language = arg_str(&args, "language").unwrap_or_else(|| "en".to_string());
        let language = language.chars().take(5).collect::<String>().to_lowercase();

        let answer = self.kb.answer(&question, &language).await?;
        let top_confidence = answer.sources.first().map(|s| s.score).unwrap_or(0.0);

        if top_confidence < self.min_confidence {
            return Ok(json!({
                "ok": false,
                "lowConfidence": true,
                "action": "CLARIFY",
                "message": "I'm not entirely sure about that. Could you rephrase your question \
                            or ask about something more specific like services, pricing, or hours?",
                "partialContext": answer.context,
                "sources": answer.sources,
            }));
        }

        Ok(json!({
            "ok": true,
            "confidenceOk": true,
            "topConfidence": top_confidence,
            "context": answer.context,
            "sources": answer.sources,
        }))
    }
}

/// Texts the caller on request (address links, confirmations).
pub struct SendTextMessage {
    sms: Arc<dyn SmsSender>,
}

#[async_trait::async_trait]
impl Capability for SendTextMessage {
    async fn invoke(&self, args: Value) -> Result<Value> {
        let to = arg_str(&args, "to").ok_or_else(|| anyhow!("`to` is required"))?;
        let message = arg_str(&args, "message").ok_or_else(|| anyhow!("`message` is required"))?;

        match self.sms.send(&to, &message).await {
            Ok(()) => Ok(json!({
                "ok": true,
                "message": format!("I've sent a text message to {to}."),
            })),
            Err(err) => Ok(json!({"ok": false, "error": err.to_string()})),
        }
    }
}

/// Hands the caller off to a human. The staff notification is fire and
/// forget: it runs in a spawned task, failures are logged, and the tool
/// result never waits on or reflects its outcome.
pub struct TransferToHuman {
    notifier: Arc<dyn StaffNotifier>,
}

#[async_trait::async_trait]
impl Capability for TransferToHuman {
    async fn invoke(&self, args: Value) -> Result<Value> {
        let event = StaffEvent::TransferRequest {
            caller_name: arg_str(&args, "callerName"),
            caller_phone: arg_str(&args, "callerPhone"),
            reason: arg_str(&args, "reason"),
            call_sid: arg_str(&args, "callSid"),
        };
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.notify(event).await {
                warn!(error = %err, "transfer notification failed");
            }
        });

        Ok(json!({
            "ok": true,
            "action": "TRANSFER",
            "message": "No problem — I'll connect you with a team member. One moment…",
        }))
    }
}

/// Politely ends sales and robocalls.
pub struct HandleSpamCall;

#[async_trait::async_trait]
impl Capability for HandleSpamCall {
    async fn invoke(&self, _args: Value) -> Result<Value> {
        Ok(json!({
            "ok": true,
            "action": "END_CALL",
            "message": "We aren't interested, but thank you for reaching out. Have a great day!",
        }))
    }
}

/// Wires the built-in capabilities and their announced specs into a registry.
pub fn default_registry(
    profile: SalonProfile,
    kb: Arc<dyn KnowledgeBase>,
    sms: Arc<dyn SmsSender>,
    notifier: Arc<dyn StaffNotifier>,
    kb_min_confidence: f64,
) -> ToolRegistry {
    let no_args = json!({"type": "object", "properties": {}});
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolSpec::new(
            "getSalonHours",
            "Get salon business hours and days closed",
            no_args.clone(),
        ),
        Arc::new(GetSalonHours {
            profile: profile.clone(),
        }),
    );
    registry.register(
        ToolSpec::new(
            "getSalonLocation",
            "Get salon address and directions",
            no_args.clone(),
        ),
        Arc::new(GetSalonLocation { profile }),
    );
    registry.register(
        ToolSpec::new(
            "answerQuestion",
            "Answer general questions about the salon using the knowledge base",
            json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string", "description": "The caller's question" },
                    "language": { "type": "string", "description": "Conversation language code, e.g. en" }
                },
                "required": ["question"]
            }),
        ),
        Arc::new(AnswerQuestion {
            kb,
            min_confidence: kb_min_confidence,
        }),
    );
    registry.register(
        ToolSpec::new(
            "sendTextMessage",
            "Send an SMS message to a phone number",
            json!({
                "type": "object",
                "properties": {
                    "to": { "type": "string", "description": "Recipient phone number" },
                    "message": { "type": "string", "description": "Message body" }
                },
                "required": ["to", "message"]
            }),
        ),
        Arc::new(SendTextMessage { sms }),
    );
    registry.register(
        ToolSpec::new(
            "transferToHuman",
            "Transfer the caller to a human staff member. Use when caller insists or for complex issues.",
            json!({
                "type": "object",
                "properties": {
                    "reason": { "type": "string", "description": "Why the caller wants a human" },
                    "callerName": { "type": "string", "description": "Caller name if given" },
                    "callerPhone": { "type": "string", "description": "Caller phone if given" }
                }
            }),
        ),
        Arc::new(TransferToHuman { notifier }),
    );
    registry.register(
        ToolSpec::new(
            "handleSpamCall",
            "Politely end spam, sales, or robocalls",
            no_args,
        ),
        Arc::new(HandleSpamCall),
    );

    registry
}
