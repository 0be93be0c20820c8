// ABOUTME: Narrow capabilities the workflow core consumes: agents, tools, and their registry
// ABOUTME: Includes an in-memory registry implementation for wiring and tests

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// An executable agent as seen by workflow steps. Provider plumbing lives
/// behind this boundary.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, input: JsonValue) -> Result<JsonValue>;
}

/// An invocable tool as seen by workflow steps.
#[async_trait]
pub trait ToolHandle: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, parameters: JsonValue) -> Result<JsonValue>;
}

/// Name-based resolution of agents and tools.
pub trait ComponentRegistry: Send + Sync {
    fn agent(&self, name: &str) -> Option<Arc<dyn AgentHandle>>;

    fn tool(&self, name: &str) -> Option<Arc<dyn ToolHandle>>;
}

/// Simple map-backed registry.
#[derive(Default)]
pub struct InMemoryComponentRegistry {
    agents: HashMap<String, Arc<dyn AgentHandle>>,
    tools: HashMap<String, Arc<dyn ToolHandle>>,
}

impl InMemoryComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_agent(&mut self, agent: Arc<dyn AgentHandle>) {
        self.agents.insert(agent.name().to_string(), agent);
    }

    pub fn register_tool(&mut self, tool: Arc<dyn ToolHandle>) {
        self.tools.insert(tool.name().to_string(), tool);
    }
}

impl ComponentRegistry for InMemoryComponentRegistry {
    fn agent(&self, name: &str) -> Option<Arc<dyn AgentHandle>> {
        self.agents.get(name).cloned()
    }

    fn tool(&self, name: &str) -> Option<Arc<dyn ToolHandle>> {
        self.tools.get(name).cloned()
    }
}

/// Closure-backed tool for wiring and tests.
pub struct FnTool<F> {
    name: String,
    func: F,
}

impl<F> FnTool<F>
where
    F: Fn(JsonValue) -> Result<JsonValue> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> ToolHandle for FnTool<F>
where
    F: Fn(JsonValue) -> Result<JsonValue> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, parameters: JsonValue) -> Result<JsonValue> {
        (self.func)(parameters)
    }
}

/// Closure-backed agent for wiring and tests.
pub struct FnAgent<F> {
    name: String,
    func: F,
}

impl<F> FnAgent<F>
where
    F: Fn(JsonValue) -> Result<JsonValue> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> AgentHandle for FnAgent<F>
where
    F: Fn(JsonValue) -> Result<JsonValue> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: JsonValue) -> Result<JsonValue> {
        (self.func)(input)
    }
}
