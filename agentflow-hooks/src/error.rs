// ABOUTME: Typed errors for the hook subsystem
// ABOUTME: Covers registry lookup failures and malformed trace headers

use thiserror::Error;

/// Errors surfaced by the hook registry and trace-context parsing.
#[derive(Debug, Error)]
pub enum HookError {
    /// No factory registered under the requested type id.
    #[error("hook type not found: {0}")]
    HookTypeNotFound(String),

    /// No hook instance registered under the given id.
    #[error("hook not found: {0}")]
    HookNotFound(String),

    /// A W3C traceparent header failed to parse. Callers ignore the header
    /// and start a fresh trace.
    #[error("invalid trace header: {0}")]
    InvalidTraceHeader(String),
}
