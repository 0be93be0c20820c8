// ABOUTME: TracingHook opening spans at begin points and closing them at matching end points
// ABOUTME: Adopts W3C trace context from metadata and injects the current header downstream

use super::{BatchSpanProcessor, LogExporter, Span, SpanContext, SpanKind, SpanProcessor, SpanStatus};
use crate::context::HookContext;
use crate::result::HookResult;
use crate::traits::Hook;
use crate::types::{HookMetadata, HookPoint, Priority};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Context metadata key carrying the W3C traceparent header.
pub const TRACE_CONTEXT_KEY: &str = "trace_context";

/// Lifecycle pairing: which span a point opens or closes.
fn span_group(point: HookPoint) -> Option<(&'static str, bool)> {
    match point {
        HookPoint::AgentBeforeRun => Some(("agent_run", true)),
        HookPoint::AgentAfterRun | HookPoint::AgentError => Some(("agent_run", false)),
        HookPoint::WorkflowStart => Some(("workflow", true)),
        HookPoint::WorkflowComplete | HookPoint::WorkflowError => Some(("workflow", false)),
        HookPoint::WorkflowStepStart => Some(("workflow_step", true)),
        HookPoint::WorkflowStepComplete | HookPoint::WorkflowStepError => {
            Some(("workflow_step", false))
        }
        HookPoint::ToolBeforeExecute => Some(("tool", true)),
        HookPoint::ToolAfterExecute | HookPoint::ToolError => Some(("tool", false)),
        HookPoint::ProviderBeforeRequest => Some(("provider", true)),
        HookPoint::ProviderAfterResponse | HookPoint::ProviderError => Some(("provider", false)),
        _ => None,
    }
}

/// Hook producing one span per begin/end point pair.
///
/// Active spans are keyed by the context's run id and lifecycle group (plus
/// a `step_id` metadata entry when present), so the begin and end halves of
/// an operation find each other without relying on context identity. A
/// valid `trace_context` header in the metadata parents the new span;
/// malformed headers are ignored and a fresh trace starts.
pub struct TracingHook {
    processor: Arc<dyn SpanProcessor>,
    active: Mutex<HashMap<String, Span>>,
    metadata: HookMetadata,
}

impl TracingHook {
    pub fn new() -> Self {
        Self::with_processor(Arc::new(BatchSpanProcessor::new(Arc::new(LogExporter))))
    }

    pub fn with_processor(processor: Arc<dyn SpanProcessor>) -> Self {
        Self {
            processor,
            active: Mutex::new(HashMap::new()),
            metadata: HookMetadata {
                name: "tracing".to_string(),
                description: Some("Span lifecycle around lifecycle point pairs".to_string()),
                priority: Priority::HIGH,
                tags: vec!["builtin".to_string(), "tracing".to_string()],
                ..HookMetadata::new("tracing_hook")
            },
        }
    }

    pub fn active_spans(&self) -> usize {
        self.active.lock().len()
    }

    fn span_key(context: &HookContext, group: &str) -> String {
        match context.metadata_str("step_id") {
            Some(step_id) => format!("{}:{}:{}", context.run_id, group, step_id),
            None => format!("{}:{}", context.run_id, group),
        }
    }

    fn start_span(&self, context: &mut HookContext, group: &str) {
        let parent = context
            .metadata_str(TRACE_CONTEXT_KEY)
            .and_then(|header| match SpanContext::parse_traceparent(header) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    debug!(error = %err, "ignoring malformed trace header");
                    None
                }
            });

        let mut span = match parent {
            Some(parent) => Span::start_child(&parent, group, SpanKind::Internal),
            None => Span::start(group, SpanKind::Internal),
        };
        span.set_attribute("hook_point", json!(context.point.to_string()));
        span.set_attribute("run_id", json!(context.run_id.to_string()));

        self.processor.on_start(&span);

        // Downstream components propagate the current span's identity.
        context.insert_metadata(TRACE_CONTEXT_KEY, json!(span.context.to_traceparent()));

        self.active
            .lock()
            .insert(Self::span_key(context, group), span);
    }

    fn end_span(&self, context: &HookContext, group: &str) {
        let Some(mut span) = self.active.lock().remove(&Self::span_key(context, group)) else {
            debug!(point = %context.point, "no active span for end point");
            return;
        };

        if context.point.is_error_point() {
            let message = context
                .metadata_str("error_message")
                .map(str::to_string)
                .or_else(|| context.input_data.as_str().map(str::to_string));
            span.set_status(SpanStatus::Error, message);
        } else {
            span.set_status(SpanStatus::Ok, None);
        }
        span.end();
        self.processor.on_end(span);
    }
}

impl Default for TracingHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Hook for TracingHook {
    async fn execute(&self, context: &mut HookContext) -> Result<HookResult> {
        if let Some((group, is_start)) = span_group(context.point) {
            if is_start {
                self.start_span(context, group);
            } else {
                self.end_span(context, group);
            }
        }
        Ok(HookResult::ok())
    }

    fn metadata(&self) -> HookMetadata {
        self.metadata.clone()
    }
}
