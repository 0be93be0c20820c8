// ABOUTME: HookResult record controlling chain continuation and payload mutation
// ABOUTME: Carries modified data, metrics, and structured error information

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Structured failure information attached to a hook result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    /// Error kind name, e.g. `"ValidationError"` or `"RateLimitError"`.
    pub error_type: String,
    pub recoverable: bool,
    pub retry_after_ms: Option<u64>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: error_type.into(),
            recoverable: false,
            retry_after_ms: None,
        }
    }

    pub fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }

    pub fn with_retry_after_ms(mut self, ms: u64) -> Self {
        self.retry_after_ms = Some(ms);
        self
    }
}

/// Outcome of a single hook invocation, and of a whole chain.
///
/// Within a chain, `modified_data` of one hook feeds the `input_data` of
/// the next; `metrics` overwrite the aggregate; `error_info` sets the
/// aggregate's continuation from its `recoverable` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookResult {
    pub continue_processing: bool,
    pub modified_data: Option<JsonValue>,
    pub metrics: Option<JsonValue>,
    pub error_info: Option<ErrorInfo>,
}

impl Default for HookResult {
    fn default() -> Self {
        Self {
            continue_processing: true,
            modified_data: None,
            metrics: None,
            error_info: None,
        }
    }
}

impl HookResult {
    /// Plain "keep going" result.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Continue with a replacement payload for downstream hooks.
    pub fn modified(data: JsonValue) -> Self {
        Self {
            modified_data: Some(data),
            ..Self::default()
        }
    }

    /// Stop the chain without an error (e.g. a cache hit short-circuit).
    pub fn halt() -> Self {
        Self {
            continue_processing: false,
            ..Self::default()
        }
    }

    /// Failure result; continuation follows the error's recoverability.
    pub fn from_error(error: ErrorInfo) -> Self {
        Self {
            continue_processing: error.recoverable,
            error_info: Some(error),
            ..Self::default()
        }
    }

    pub fn with_metrics(mut self, metrics: JsonValue) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// A result allows further processing iff the flag is set and no error
    /// was recorded.
    pub fn should_continue(&self) -> bool {
        self.continue_processing && self.error_info.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error_info.is_some()
    }
}
