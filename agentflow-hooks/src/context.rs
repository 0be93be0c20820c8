// ABOUTME: HookContext carrying per-invocation data through a chain execution
// ABOUTME: EnhancedHookContext adds shared state, parent/child nesting, and a transformation log

use crate::result::ErrorInfo;
use crate::types::HookPoint;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use uuid::Uuid;

/// Narrow view of the agent that triggered a hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentReference {
    pub agent_id: String,
    pub agent_name: String,
    pub metadata: HashMap<String, JsonValue>,
}

impl AgentReference {
    pub fn new(agent_id: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Per-invocation context handed to every hook in a chain.
///
/// Lives for exactly one chain execution. The chain updates `hook_index`
/// and `total_hooks` as it walks its entries, and copies each hook's
/// `modified_data` into `input_data` so mutations feed the next hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookContext {
    pub point: HookPoint,
    pub agent: Option<AgentReference>,
    /// Identifies the surrounding run (agent invocation or workflow
    /// instance). Chains executing for the same run share this id.
    pub run_id: Uuid,
    pub input_data: JsonValue,
    pub output_data: JsonValue,
    pub metadata: HashMap<String, JsonValue>,
    pub start_time: DateTime<Utc>,
    pub hook_index: usize,
    pub total_hooks: usize,
}

impl HookContext {
    pub fn new(point: HookPoint) -> Self {
        Self {
            point,
            agent: None,
            run_id: Uuid::new_v4(),
            input_data: JsonValue::Null,
            output_data: JsonValue::Null,
            metadata: HashMap::new(),
            start_time: Utc::now(),
            hook_index: 0,
            total_hooks: 0,
        }
    }

    pub fn with_input(mut self, input: JsonValue) -> Self {
        self.input_data = input;
        self
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_agent(mut self, agent: AgentReference) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn insert_metadata(&mut self, key: impl Into<String>, value: JsonValue) {
        self.metadata.insert(key.into(), value);
    }

    pub fn get_metadata(&self, key: &str) -> Option<&JsonValue> {
        self.metadata.get(key)
    }

    /// String view of a metadata entry, for header-style values.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Builder for contexts with several optional fields.
pub struct HookContextBuilder {
    context: HookContext,
}

impl HookContextBuilder {
    pub fn new(point: HookPoint) -> Self {
        Self {
            context: HookContext::new(point),
        }
    }

    pub fn agent(mut self, agent: AgentReference) -> Self {
        self.context.agent = Some(agent);
        self
    }

    pub fn run_id(mut self, run_id: Uuid) -> Self {
        self.context.run_id = run_id;
        self
    }

    pub fn input(mut self, input: JsonValue) -> Self {
        self.context.input_data = input;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.context.metadata.insert(key.into(), value);
        self
    }

    pub fn build(self) -> HookContext {
        self.context
    }
}

/// JSON key/value store shared between a context and its children.
pub type SharedStateStore = Arc<RwLock<HashMap<String, JsonValue>>>;

/// One recorded payload transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationRecord {
    pub hook_id: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Execution counters accumulated while a context is alive.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetrics {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, f64>,
    pub timers: HashMap<String, Duration>,
}

/// Context with nesting and accumulation on top of [`HookContext`].
///
/// Children share the parent's state store by reference; the parent keeps
/// owning references to its children while children only hold a weak
/// back-reference (the parent always outlives the child).
pub struct EnhancedHookContext {
    pub context: HookContext,
    state: SharedStateStore,
    parent: Option<Weak<RwLock<EnhancedHookContext>>>,
    children: Vec<Arc<RwLock<EnhancedHookContext>>>,
    pub metrics: ExecutionMetrics,
    pub span_ids: Vec<String>,
    pub errors: Vec<ErrorInfo>,
    pub transformations: Vec<TransformationRecord>,
}

impl EnhancedHookContext {
    pub fn new(context: HookContext) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(Self {
            context,
            state: Arc::new(RwLock::new(HashMap::new())),
            parent: None,
            children: Vec::new(),
            metrics: ExecutionMetrics::default(),
            span_ids: Vec::new(),
            errors: Vec::new(),
            transformations: Vec::new(),
        }))
    }

    /// Creates a child context for a nested chain execution. The child
    /// shares this context's state store and run id.
    pub fn child(parent: &Arc<RwLock<Self>>, point: HookPoint) -> Arc<RwLock<Self>> {
        let (state, run_id, agent) = {
            let guard = parent.read();
            (
                guard.state.clone(),
                guard.context.run_id,
                guard.context.agent.clone(),
            )
        };

        let mut context = HookContext::new(point).with_run_id(run_id);
        context.agent = agent;

        let child = Arc::new(RwLock::new(Self {
            context,
            state,
            parent: Some(Arc::downgrade(parent)),
            children: Vec::new(),
            metrics: ExecutionMetrics::default(),
            span_ids: Vec::new(),
            errors: Vec::new(),
            transformations: Vec::new(),
        }));

        parent.write().children.push(child.clone());
        child
    }

    pub fn parent(&self) -> Option<Arc<RwLock<EnhancedHookContext>>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn children(&self) -> &[Arc<RwLock<EnhancedHookContext>>] {
        &self.children
    }

    pub fn set_state(&self, key: impl Into<String>, value: JsonValue) {
        self.state.write().insert(key.into(), value);
    }

    pub fn get_state(&self, key: &str) -> Option<JsonValue> {
        self.state.read().get(key).cloned()
    }

    pub fn increment_counter(&mut self, name: &str, delta: u64) {
        *self.metrics.counters.entry(name.to_string()).or_insert(0) += delta;
    }

    pub fn set_gauge(&mut self, name: &str, value: f64) {
        self.metrics.gauges.insert(name.to_string(), value);
    }

    pub fn record_timer(&mut self, name: &str, elapsed: Duration) {
        self.metrics.timers.insert(name.to_string(), elapsed);
    }

    pub fn record_error(&mut self, error: ErrorInfo) {
        self.errors.push(error);
    }

    pub fn record_transformation(&mut self, hook_id: &str, description: impl Into<String>) {
        self.transformations.push(TransformationRecord {
            hook_id: hook_id.to_string(),
            description: description.into(),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_builder() {
        let run_id = Uuid::new_v4();
        let context = HookContextBuilder::new(HookPoint::AgentBeforeRun)
            .run_id(run_id)
            .agent(AgentReference::new("a1", "assistant"))
            .input(json!({"prompt": "hi"}))
            .metadata("channel", json!("cli"))
            .build();

        assert_eq!(context.point, HookPoint::AgentBeforeRun);
        assert_eq!(context.run_id, run_id);
        assert_eq!(context.input_data, json!({"prompt": "hi"}));
        assert_eq!(context.metadata_str("channel"), Some("cli"));
    }

    #[test]
    fn test_child_shares_state_store() {
        let parent = EnhancedHookContext::new(HookContext::new(HookPoint::WorkflowStart));
        parent.read().set_state("budget", json!(10));

        let child = EnhancedHookContext::child(&parent, HookPoint::WorkflowStepStart);
        assert_eq!(child.read().get_state("budget"), Some(json!(10)));

        // Writes through the child are visible to the parent.
        child.read().set_state("budget", json!(7));
        assert_eq!(parent.read().get_state("budget"), Some(json!(7)));

        assert_eq!(parent.read().children().len(), 1);
        assert!(child.read().parent().is_some());
    }

    #[test]
    fn test_child_inherits_run_id() {
        let parent = EnhancedHookContext::new(HookContext::new(HookPoint::WorkflowStart));
        let run_id = parent.read().context.run_id;

        let child = EnhancedHookContext::child(&parent, HookPoint::WorkflowStepStart);
        assert_eq!(child.read().context.run_id, run_id);
    }

    #[test]
    fn test_metric_accumulation() {
        let ctx = EnhancedHookContext::new(HookContext::new(HookPoint::AgentBeforeRun));
        {
            let mut guard = ctx.write();
            guard.increment_counter("invocations", 1);
            guard.increment_counter("invocations", 2);
            guard.set_gauge("depth", 1.0);
            guard.record_timer("chain", Duration::from_millis(5));
            guard.record_transformation("redactor", "masked credentials");
        }

        let guard = ctx.read();
        assert_eq!(guard.metrics.counters.get("invocations"), Some(&3));
        assert_eq!(guard.transformations.len(), 1);
    }
}
