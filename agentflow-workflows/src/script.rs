// ABOUTME: Script step execution through external interpreter processes
// ABOUTME: Passes the context as WORKFLOW_CONTEXT and parses stdout as JSON

use crate::error::WorkflowError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::process::Command;
use tracing::debug;

/// Default capture cap for stdout and stderr.
const DEFAULT_CAPTURE_CAP: usize = 64 * 1024;

/// Supported interpreters and their inline-script flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptInterpreter {
    Shell,
    Python,
    Node,
    Lua,
}

impl ScriptInterpreter {
    /// Interpreter binary plus the flag that takes an inline script.
    pub fn command(&self) -> (&'static str, &'static str) {
        match self {
            ScriptInterpreter::Shell => ("sh", "-c"),
            ScriptInterpreter::Python => ("python3", "-c"),
            ScriptInterpreter::Node => ("node", "-e"),
            ScriptInterpreter::Lua => ("lua", "-e"),
        }
    }
}

/// Runs a script step: `<interpreter> [-c|-e] <script>` with the JSON
/// projection of the execution context in `WORKFLOW_CONTEXT`. A zero exit
/// code is success; stdout is parsed as JSON with a plain-string fallback.
pub async fn run_script(
    step_id: &str,
    interpreter: ScriptInterpreter,
    script: &str,
    context_json: &JsonValue,
    stdout_cap: Option<usize>,
    stderr_cap: Option<usize>,
) -> Result<JsonValue, WorkflowError> {
    let (program, flag) = interpreter.command();
    debug!(step = %step_id, program, "spawning script step");

    let output = Command::new(program)
        .arg(flag)
        .arg(script)
        .env("WORKFLOW_CONTEXT", context_json.to_string())
        .output()
        .await
        .map_err(|err| WorkflowError::StepExecutionFailed {
            step_id: step_id.to_string(),
            message: format!("failed to spawn {}: {}", program, err),
        })?;

    let stdout = truncate_capture(&output.stdout, stdout_cap.unwrap_or(DEFAULT_CAPTURE_CAP));
    let stderr = truncate_capture(&output.stderr, stderr_cap.unwrap_or(DEFAULT_CAPTURE_CAP));

    if !output.status.success() {
        return Err(WorkflowError::StepExecutionFailed {
            step_id: step_id.to_string(),
            message: format!(
                "script exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        });
    }

    let trimmed = stdout.trim();
    Ok(serde_json::from_str(trimmed).unwrap_or_else(|_| JsonValue::String(trimmed.to_string())))
}

fn truncate_capture(bytes: &[u8], cap: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= cap {
        text.into_owned()
    } else {
        let mut end = cap;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }
}
