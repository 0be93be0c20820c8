// ABOUTME: Distributed tracing span model with W3C trace-context interop
// ABOUTME: Trace and span identifiers come from the thread-local RNG

pub mod hook;
pub mod processor;

pub use hook::TracingHook;
pub use processor::{BatchSpanProcessor, LogExporter, SpanExporter, SpanProcessor};

use crate::error::HookError;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;

/// 128-bit trace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(pub [u8; 16]);

impl TraceId {
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        while bytes == [0u8; 16] {
            rand::thread_rng().fill_bytes(&mut bytes);
        }
        Self(bytes)
    }

    pub fn is_valid(&self) -> bool {
        self.0 != [0u8; 16]
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// 64-bit span identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanId(pub [u8; 8]);

impl SpanId {
    pub fn random() -> Self {
        let mut bytes = [0u8; 8];
        while bytes == [0u8; 8] {
            rand::thread_rng().fill_bytes(&mut bytes);
        }
        Self(bytes)
    }

    pub fn is_valid(&self) -> bool {
        self.0 != [0u8; 8]
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Sampled flag as carried in the traceparent flags byte.
pub const FLAG_SAMPLED: u8 = 0x01;

/// Propagated identity of a span: what crosses process boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub flags: u8,
}

impl SpanContext {
    pub fn new_root() -> Self {
        Self {
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            flags: FLAG_SAMPLED,
        }
    }

    /// New span in the same trace.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::random(),
            flags: self.flags,
        }
    }

    pub fn is_sampled(&self) -> bool {
        self.flags & FLAG_SAMPLED != 0
    }

    /// W3C traceparent header: `00-<trace_id>-<span_id>-<flags>`.
    pub fn to_traceparent(&self) -> String {
        format!("00-{}-{}-{:02x}", self.trace_id, self.span_id, self.flags)
    }

    /// Parses a traceparent header. Only version `00` with exact field
    /// lengths is accepted.
    pub fn parse_traceparent(header: &str) -> Result<Self, HookError> {
        let parts: Vec<&str> = header.split('-').collect();
        if parts.len() != 4 {
            return Err(HookError::InvalidTraceHeader(format!(
                "expected 4 fields, got {}",
                parts.len()
            )));
        }
        if parts[0] != "00" {
            return Err(HookError::InvalidTraceHeader(format!(
                "unsupported version '{}'",
                parts[0]
            )));
        }
        if parts[1].len() != 32 || parts[2].len() != 16 || parts[3].len() != 2 {
            return Err(HookError::InvalidTraceHeader(
                "wrong field lengths".to_string(),
            ));
        }

        let trace_bytes = decode_hex(parts[1])
            .ok_or_else(|| HookError::InvalidTraceHeader("bad trace id hex".to_string()))?;
        let span_bytes = decode_hex(parts[2])
            .ok_or_else(|| HookError::InvalidTraceHeader("bad span id hex".to_string()))?;
        let flags = u8::from_str_radix(parts[3], 16)
            .map_err(|_| HookError::InvalidTraceHeader("bad flags hex".to_string()))?;

        let mut trace_id = [0u8; 16];
        trace_id.copy_from_slice(&trace_bytes);
        let mut span_id = [0u8; 8];
        span_id.copy_from_slice(&span_bytes);

        let context = Self {
            trace_id: TraceId(trace_id),
            span_id: SpanId(span_id),
            flags,
        };
        if !context.trace_id.is_valid() || !context.span_id.is_valid() {
            return Err(HookError::InvalidTraceHeader("all-zero id".to_string()));
        }
        Ok(context)
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Role of a span relative to its trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    #[default]
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

/// Terminal status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error,
}

/// Timestamped annotation within a span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    /// Microseconds since the Unix epoch.
    pub timestamp_us: i64,
    pub attributes: HashMap<String, JsonValue>,
}

/// Reference to a related span in this or another trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanLink {
    pub context: SpanContext,
    pub attributes: HashMap<String, JsonValue>,
}

/// One unit of a distributed trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub context: SpanContext,
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub kind: SpanKind,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SpanStatus,
    pub status_message: Option<String>,
    pub attributes: HashMap<String, JsonValue>,
    pub events: Vec<SpanEvent>,
    pub links: Vec<SpanLink>,
}

impl Span {
    /// Starts a new root span.
    pub fn start(name: impl Into<String>, kind: SpanKind) -> Self {
        Self::started(SpanContext::new_root(), None, name, kind)
    }

    /// Starts a child span within an existing trace.
    pub fn start_child(parent: &SpanContext, name: impl Into<String>, kind: SpanKind) -> Self {
        Self::started(parent.child(), Some(parent.span_id), name, kind)
    }

    fn started(
        context: SpanContext,
        parent_span_id: Option<SpanId>,
        name: impl Into<String>,
        kind: SpanKind,
    ) -> Self {
        Self {
            context,
            parent_span_id,
            name: name.into(),
            kind,
            start_time: Utc::now(),
            end_time: None,
            status: SpanStatus::Unset,
            status_message: None,
            attributes: HashMap::new(),
            events: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: JsonValue) {
        self.attributes.insert(key.into(), value);
    }

    pub fn add_event(&mut self, name: impl Into<String>) {
        self.events.push(SpanEvent {
            name: name.into(),
            timestamp_us: Utc::now().timestamp_micros(),
            attributes: HashMap::new(),
        });
    }

    pub fn add_link(&mut self, context: SpanContext) {
        self.links.push(SpanLink {
            context,
            attributes: HashMap::new(),
        });
    }

    pub fn set_status(&mut self, status: SpanStatus, message: Option<String>) {
        self.status = status;
        self.status_message = message;
    }

    /// Stamps the end time. Idempotent: later calls leave the first stamp.
    pub fn end(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
    }

    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_nonzero_and_hex() {
        let trace_id = TraceId::random();
        let span_id = SpanId::random();
        assert!(trace_id.is_valid());
        assert!(span_id.is_valid());
        assert_eq!(trace_id.to_string().len(), 32);
        assert_eq!(span_id.to_string().len(), 16);
    }

    #[test]
    fn test_traceparent_round_trip() {
        let context = SpanContext::new_root();
        let header = context.to_traceparent();

        assert!(header.starts_with("00-"));
        assert!(header.ends_with("-01"));

        let parsed = SpanContext::parse_traceparent(&header).unwrap();
        assert_eq!(parsed, context);
    }

    #[test]
    fn test_traceparent_rejects_malformed_headers() {
        // Wrong version.
        assert!(SpanContext::parse_traceparent(
            "01-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"
        )
        .is_err());
        // Wrong trace id length.
        assert!(SpanContext::parse_traceparent("00-abcd-b7ad6b7169203331-01").is_err());
        // Missing fields.
        assert!(SpanContext::parse_traceparent("00-abc").is_err());
        // Non-hex content.
        assert!(SpanContext::parse_traceparent(
            "00-zzf7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"
        )
        .is_err());
        // All-zero trace id.
        assert!(SpanContext::parse_traceparent(
            "00-00000000000000000000000000000000-b7ad6b7169203331-01"
        )
        .is_err());
    }

    #[test]
    fn test_child_keeps_trace_id() {
        let root = SpanContext::new_root();
        let child = root.child();
        assert_eq!(child.trace_id, root.trace_id);
        assert_ne!(child.span_id, root.span_id);
    }

    #[test]
    fn test_span_lifecycle_and_idempotent_end() {
        let mut span = Span::start("chain.execute", SpanKind::Internal);
        span.set_attribute("point", serde_json::json!("agent_before_run"));
        span.add_event("first_hook");

        assert!(!span.is_ended());
        span.end();
        let first_stamp = span.end_time;
        span.end();
        assert_eq!(span.end_time, first_stamp);

        assert_eq!(span.events.len(), 1);
        assert!(span.events[0].timestamp_us > 0);
    }

    #[test]
    fn test_child_span_links_parent() {
        let parent = SpanContext::new_root();
        let child = Span::start_child(&parent, "step", SpanKind::Internal);
        assert_eq!(child.parent_span_id, Some(parent.span_id));
        assert_eq!(child.context.trace_id, parent.trace_id);
    }
}
