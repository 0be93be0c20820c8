// ABOUTME: Workflow data model: step union, step metadata, and immutable definitions
// ABOUTME: Definitions are built through a builder and never mutated afterwards

use crate::script::ScriptInterpreter;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Expression dialects accepted by conditional and loop steps. Only the
/// simple `LHS OP RHS` dialect evaluates; the others reject explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dialect", content = "expression", rename_all = "snake_case")]
pub enum ConditionExpression {
    Simple(String),
    JsonPath(String),
    JavaScript(String),
}

impl ConditionExpression {
    pub fn simple(expression: impl Into<String>) -> Self {
        ConditionExpression::Simple(expression.into())
    }
}

/// Loop flavor of a loop step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoopKind {
    /// Loop while the condition holds.
    While { condition: ConditionExpression },
    /// Fixed iteration count; defaults to 100 when unset.
    For { count: Option<u64> },
    /// Iterate over the `variables.items` array.
    ForEach,
}

/// Tagged union of everything a workflow step can do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepType {
    /// Resolve an agent by name and execute it. String values of the form
    /// `$variables.x` in the input are substituted from the context.
    Agent {
        agent_name: String,
        input: JsonValue,
    },
    /// Resolve a tool by name and invoke it with parameters.
    Tool {
        tool_name: String,
        parameters: JsonValue,
    },
    /// Evaluate an expression; run one of two branches.
    Condition {
        expression: ConditionExpression,
        true_steps: Vec<WorkflowStep>,
        false_steps: Vec<WorkflowStep>,
    },
    /// Iterate a body of steps.
    Loop {
        kind: LoopKind,
        body: Vec<WorkflowStep>,
        max_iterations: Option<u64>,
        #[serde(default)]
        break_on_error: bool,
    },
    /// Run embedded steps concurrently.
    Parallel { steps: Vec<WorkflowStep> },
    /// Run embedded steps in order through a nested executor.
    Sequential { steps: Vec<WorkflowStep> },
    /// Spawn an external interpreter process.
    Script {
        interpreter: ScriptInterpreter,
        script: String,
        #[serde(default)]
        stdout_cap: Option<usize>,
        #[serde(default)]
        stderr_cap: Option<usize>,
    },
    /// Sleep for a duration plus optional random jitter.
    Delay {
        duration_ms: u64,
        #[serde(default)]
        jitter_percent: f64,
    },
    /// Project dot paths from the execution context into a fresh object.
    Transform { mappings: HashMap<String, String> },
}

/// One step of a workflow with its retry/error policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    pub step_type: StepType,
    pub description: Option<String>,
    pub timeout_ms: Option<u64>,
    /// Additional attempts after the first failure.
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, step_type: StepType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            step_type,
            description: None,
            timeout_ms: None,
            retry_count: 0,
            retry_delay_ms: 0,
            continue_on_error: false,
            tags: Vec::new(),
        }
    }

    pub fn delay(id: impl Into<String>, duration_ms: u64) -> Self {
        Self::new(
            id,
            StepType::Delay {
                duration_ms,
                jitter_percent: 0.0,
            },
        )
    }

    pub fn with_retries(mut self, retry_count: u32, retry_delay_ms: u64) -> Self {
        self.retry_count = retry_count;
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Immutable workflow: identity, ordered steps, schemas, and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub steps: Vec<WorkflowStep>,
    pub input_schema: Option<JsonValue>,
    pub output_schema: Option<JsonValue>,
    pub variable_defaults: HashMap<String, JsonValue>,
    pub metadata: HashMap<String, JsonValue>,
}

impl WorkflowDefinition {
    pub fn builder(id: impl Into<String>) -> WorkflowDefinitionBuilder {
        WorkflowDefinitionBuilder::new(id)
    }
}

/// Builder producing immutable [`WorkflowDefinition`]s.
pub struct WorkflowDefinitionBuilder {
    definition: WorkflowDefinition,
}

impl WorkflowDefinitionBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            definition: WorkflowDefinition {
                name: id.clone(),
                id,
                description: None,
                version: "1.0.0".to_string(),
                steps: Vec::new(),
                input_schema: None,
                output_schema: None,
                variable_defaults: HashMap::new(),
                metadata: HashMap::new(),
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.definition.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.definition.description = Some(description.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.definition.version = version.into();
        self
    }

    pub fn step(mut self, step: WorkflowStep) -> Self {
        self.definition.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = WorkflowStep>) -> Self {
        self.definition.steps.extend(steps);
        self
    }

    pub fn input_schema(mut self, schema: JsonValue) -> Self {
        self.definition.input_schema = Some(schema);
        self
    }

    pub fn output_schema(mut self, schema: JsonValue) -> Self {
        self.definition.output_schema = Some(schema);
        self
    }

    pub fn variable_default(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.definition.variable_defaults.insert(key.into(), value);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.definition.metadata.insert(key.into(), value);
        self
    }

    pub fn build(self) -> WorkflowDefinition {
        self.definition
    }
}
