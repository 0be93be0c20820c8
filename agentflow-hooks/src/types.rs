// ABOUTME: Core types for the hook system including HookPoint, Priority, and HookMetadata
// ABOUTME: Defines every lifecycle point an interceptor may attach to

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// All lifecycle points in the system.
///
/// `Custom` is the wildcard: a hook declaring it runs at every point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    // Agent lifecycle
    AgentInit,
    AgentBeforeRun,
    AgentAfterRun,
    AgentCleanup,
    AgentError,

    // Workflow lifecycle
    WorkflowStart,
    WorkflowStepStart,
    WorkflowStepComplete,
    WorkflowStepError,
    WorkflowComplete,
    WorkflowError,

    // Tool execution
    ToolBeforeExecute,
    ToolAfterExecute,
    ToolError,

    // Provider calls
    ProviderBeforeRequest,
    ProviderAfterResponse,
    ProviderError,

    // Memory persistence
    MemoryBeforeSave,
    MemoryAfterLoad,

    // Wildcard: matches every point
    Custom,
}

impl HookPoint {
    /// Stable wire name used in cache keys and metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::AgentInit => "agent_init",
            HookPoint::AgentBeforeRun => "agent_before_run",
            HookPoint::AgentAfterRun => "agent_after_run",
            HookPoint::AgentCleanup => "agent_cleanup",
            HookPoint::AgentError => "agent_error",
            HookPoint::WorkflowStart => "workflow_start",
            HookPoint::WorkflowStepStart => "workflow_step_start",
            HookPoint::WorkflowStepComplete => "workflow_step_complete",
            HookPoint::WorkflowStepError => "workflow_step_error",
            HookPoint::WorkflowComplete => "workflow_complete",
            HookPoint::WorkflowError => "workflow_error",
            HookPoint::ToolBeforeExecute => "tool_before_execute",
            HookPoint::ToolAfterExecute => "tool_after_execute",
            HookPoint::ToolError => "tool_error",
            HookPoint::ProviderBeforeRequest => "provider_before_request",
            HookPoint::ProviderAfterResponse => "provider_after_response",
            HookPoint::ProviderError => "provider_error",
            HookPoint::MemoryBeforeSave => "memory_before_save",
            HookPoint::MemoryAfterLoad => "memory_after_load",
            HookPoint::Custom => "custom",
        }
    }

    /// Whether this point represents a failure in the host lifecycle.
    pub fn is_error_point(&self) -> bool {
        matches!(
            self,
            HookPoint::AgentError
                | HookPoint::WorkflowError
                | HookPoint::WorkflowStepError
                | HookPoint::ToolError
                | HookPoint::ProviderError
        )
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hook priority for execution ordering. Lower values execute earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(pub i32);

impl Priority {
    pub const HIGHEST: Priority = Priority(-1000);
    pub const HIGH: Priority = Priority(-100);
    pub const NORMAL: Priority = Priority(0);
    pub const LOW: Priority = Priority(100);
    pub const LOWEST: Priority = Priority(1000);

    /// True when this priority executes before `other`.
    pub fn executes_before(&self, other: &Priority) -> bool {
        self.0 < other.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

/// Identity and placement information for a hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookMetadata {
    /// Unique id within a registry.
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub priority: Priority,
    /// Explicit points this hook supports. Empty means "global": the
    /// registry places the hook in the global chain and it runs for every
    /// point. `Custom` in the set is the equivalent wildcard.
    pub supported_points: Vec<HookPoint>,
    pub enabled: bool,
    /// Opaque configuration handed to the hook's factory.
    pub config: Option<JsonValue>,
    pub tags: Vec<String>,
    pub version: String,
}

impl HookMetadata {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_points(mut self, points: Vec<HookPoint>) -> Self {
        self.supported_points = points;
        self
    }

    /// Whether the hook should run for `point`. An empty set and the
    /// `Custom` wildcard both match everything.
    pub fn applies_to(&self, point: HookPoint) -> bool {
        self.supported_points.is_empty()
            || self
                .supported_points
                .iter()
                .any(|p| *p == point || *p == HookPoint::Custom)
    }

    /// Hooks without explicit points belong in the registry's global chain.
    pub fn is_global(&self) -> bool {
        self.supported_points.is_empty() || self.supported_points.contains(&HookPoint::Custom)
    }
}

impl Default for HookMetadata {
    fn default() -> Self {
        Self {
            id: String::from("unnamed"),
            name: String::from("unnamed"),
            description: None,
            priority: Priority::default(),
            supported_points: Vec::new(),
            enabled: true,
            config: None,
            tags: Vec::new(),
            version: String::from("1.0.0"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_point_wire_names() {
        assert_eq!(HookPoint::AgentBeforeRun.to_string(), "agent_before_run");
        assert_eq!(HookPoint::ProviderError.to_string(), "provider_error");
        assert_eq!(HookPoint::Custom.to_string(), "custom");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::HIGHEST < Priority::HIGH);
        assert!(Priority::HIGH < Priority::NORMAL);
        assert!(Priority::NORMAL < Priority::LOW);
        assert!(Priority::LOW < Priority::LOWEST);
        assert!(Priority::HIGH.executes_before(&Priority::LOW));
    }

    #[test]
    fn test_supported_point_matching() {
        let explicit = HookMetadata::new("h").with_points(vec![HookPoint::AgentBeforeRun]);
        assert!(explicit.applies_to(HookPoint::AgentBeforeRun));
        assert!(!explicit.applies_to(HookPoint::ToolError));
        assert!(!explicit.is_global());

        let wildcard = HookMetadata::new("w").with_points(vec![HookPoint::Custom]);
        assert!(wildcard.applies_to(HookPoint::ToolError));
        assert!(wildcard.is_global());

        let global = HookMetadata::new("g");
        assert!(global.applies_to(HookPoint::MemoryAfterLoad));
        assert!(global.is_global());
    }
}
