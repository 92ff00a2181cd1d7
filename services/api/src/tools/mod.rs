//! Tool dispatch: correlates the model's tool-call events to registered
//! backend capabilities.
//!
//! The dispatcher never fails outward. Unknown names and capability errors
//! all collapse into a structured `{ok:false, error}` payload the assistant
//! can recover from conversationally, and every dispatch produces exactly
//! one result.

pub mod builtin;

use frontdesk_realtime::{ToolHandler, ToolSpec};
use serde_json::{Value, json};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, warn};

/// One callable backend capability. Implementations hold their own
/// collaborator handles and must be safe for concurrent calls.
#[async_trait::async_trait]
pub trait Capability: Send + Sync {
    async fn invoke(&self, args: Value) -> anyhow::Result<Value>;
}

/// Explicit name → capability map plus the static [`ToolSpec`] list announced
/// once at session negotiation. Configuration, not per-call state.
#[derive(Default)]
pub struct ToolRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
    specs: Vec<ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        spec: ToolSpec,
        capability: Arc<dyn Capability>,
    ) -> &mut Self {
        self.capabilities.insert(spec.name.clone(), capability);
        self.specs.push(spec);
        self
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.capabilities.get(name)
    }
}

/// Call-scoped fields injected into every tool invocation so domain logic
/// can correlate side effects with the originating call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub call_sid: Option<String>,
}

/// Looks tool calls up in the registry and invokes them. Shared read-only
/// across all simultaneous calls.
pub struct ToolDispatcher {
    registry: ToolRegistry,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn specs(&self) -> &[ToolSpec] {
        self.registry.specs()
    }

    /// Resolves one tool call to exactly one result value, never an error.
    pub async fn dispatch(&self, name: &str, args: Value, ctx: &CallContext) -> Value {
        let mut args = match args {
            Value::Object(_) => args,
            _ => json!({}),
        };
        if let (Some(call_sid), Some(obj)) = (&ctx.call_sid, args.as_object_mut()) {
            obj.insert("callSid".to_string(), json!(call_sid));
        }

        let Some(capability) = self.registry.get(name) else {
            warn!(tool = name, "unknown tool requested");
            return json!({"ok": false, "error": format!("unknown tool {name}")});
        };

        info!(tool = name, "dispatching tool call");
        match capability.invoke(args).await {
            Ok(output) => output,
            Err(err) => {
                warn!(tool = name, error = %err, "tool execution failed");
                json!({"ok": false, "error": err.to_string()})
            }
        }
    }
}

/// Per-call adapter plugging the shared dispatcher into a realtime session.
pub struct CallToolHandler {
    dispatcher: Arc<ToolDispatcher>,
    ctx: CallContext,
}

impl CallToolHandler {
    pub fn new(dispatcher: Arc<ToolDispatcher>, ctx: CallContext) -> Self {
        Self { dispatcher, ctx }
    }
}

#[async_trait::async_trait]
impl ToolHandler for CallToolHandler {
    async fn handle(&self, name: &str, args: Value) -> Value {
        self.dispatcher.dispatch(name, args, &self.ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo;

    #[async_trait::async_trait]
    impl Capability for Echo {
        async fn invoke(&self, args: Value) -> anyhow::Result<Value> {
            Ok(json!({"ok": true, "echo": args}))
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl Capability for Failing {
        async fn invoke(&self, _args: Value) -> anyhow::Result<Value> {
            Err(anyhow!("backend unavailable"))
        }
    }

    struct Counting(AtomicUsize);

    #[async_trait::async_trait]
    impl Capability for Counting {
        async fn invoke(&self, _args: Value) -> anyhow::Result<Value> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"ok": true}))
        }
    }

    fn spec(name: &str) -> ToolSpec {
        ToolSpec::new(name, "test tool", json!({"type": "object", "properties": {}}))
    }

    fn dispatcher_with(name: &str, capability: Arc<dyn Capability>) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(spec(name), capability);
        ToolDispatcher::new(registry)
    }

    #[tokio::test]
    async fn unknown_tool_returns_structured_error() {
        let dispatcher = ToolDispatcher::new(ToolRegistry::new());
        let result = dispatcher
            .dispatch("unknownTool", json!({}), &CallContext::default())
            .await;
        assert_eq!(
            result,
            json!({"ok": false, "error": "unknown tool unknownTool"})
        );
    }

    #[tokio::test]
    async fn capability_errors_are_caught() {
        let dispatcher = dispatcher_with("flaky", Arc::new(Failing));
        let result = dispatcher
            .dispatch("flaky", json!({}), &CallContext::default())
            .await;
        assert_eq!(result["ok"], false);
        assert_eq!(result["error"], "backend unavailable");
    }

    #[tokio::test]
    async fn call_sid_is_injected_into_args() {
        let dispatcher = dispatcher_with("echo", Arc::new(Echo));
        let ctx = CallContext {
            call_sid: Some("CA123".to_string()),
        };
        let result = dispatcher
            .dispatch("echo", json!({"question": "hours?"}), &ctx)
            .await;
        assert_eq!(result["echo"]["callSid"], "CA123");
        assert_eq!(result["echo"]["question"], "hours?");

        // Non-object args are replaced by an empty object, still injected.
        let result = dispatcher.dispatch("echo", json!("garbage"), &ctx).await;
        assert_eq!(result["echo"], json!({"callSid": "CA123"}));
    }

    #[tokio::test]
    async fn exactly_one_invocation_per_dispatch() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let dispatcher = dispatcher_with("counted", counter.clone());
        for _ in 0..3 {
            dispatcher
                .dispatch("counted", json!({}), &CallContext::default())
                .await;
        }
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn handler_adapter_forwards_call_context() {
        let dispatcher = Arc::new(dispatcher_with("echo", Arc::new(Echo)));
        let handler = CallToolHandler::new(
            dispatcher,
            CallContext {
                call_sid: Some("CA9".to_string()),
            },
        );
        let result = handler.handle("echo", json!({})).await;
        assert_eq!(result["echo"]["callSid"], "CA9");
    }
}
