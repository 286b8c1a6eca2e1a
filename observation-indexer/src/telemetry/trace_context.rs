//! W3C `traceparent` propagation through the job carrier.
//!
//! The upload side injects its request context into the job; the worker
//! extracts it and opens its processing span as a child. A missing or
//! malformed carrier only means the span is not linked.

use observation_shared::TraceCarrier;
use uuid::Uuid;

/// Carrier key for the W3C trace context header.
pub const TRACEPARENT: &str = "traceparent";

const VERSION: &str = "00";
const FLAG_SAMPLED: u8 = 0x01;

/// Identifiers of one span within a distributed trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// 32 lowercase hex characters.
    pub trace_id: String,
    /// 16 lowercase hex characters.
    pub span_id: String,
    pub sampled: bool,
}

impl TraceContext {
    /// Start a new trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: format!("{:032x}", Uuid::new_v4().as_u128()),
            span_id: new_span_id(),
            sampled: true,
        }
    }

    /// A new span in the same trace as `parent`.
    pub fn child_of(parent: &TraceContext) -> Self {
        Self {
            trace_id: parent.trace_id.clone(),
            span_id: new_span_id(),
            sampled: parent.sampled,
        }
    }

    /// Parse a `traceparent` header value.
    ///
    /// Returns `None` for anything that is not `version-traceid-spanid-flags`
    /// with the right lengths, or that carries an all-zero id.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;

        if version.len() != 2 || !is_hex(version) || version == "ff" {
            return None;
        }
        // Version 00 has exactly four fields; later versions may append more.
        if version == VERSION && parts.next().is_some() {
            return None;
        }
        if !is_valid_id(trace_id, 32) || !is_valid_id(span_id, 16) {
            return None;
        }
        if flags.len() != 2 {
            return None;
        }
        let flags = u8::from_str_radix(flags, 16).ok()?;

        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            span_id: span_id.to_ascii_lowercase(),
            sampled: flags & FLAG_SAMPLED != 0,
        })
    }

    /// Format as a `traceparent` header value.
    pub fn to_traceparent(&self) -> String {
        let flags = if self.sampled { FLAG_SAMPLED } else { 0 };
        format!("{}-{}-{}-{:02x}", VERSION, self.trace_id, self.span_id, flags)
    }

    /// Write this context into a job carrier.
    pub fn inject(&self, carrier: &mut TraceCarrier) {
        carrier.insert(TRACEPARENT.to_string(), self.to_traceparent());
    }

    /// Read a context from a job carrier.
    pub fn extract(carrier: &TraceCarrier) -> Option<Self> {
        carrier.get(TRACEPARENT).and_then(|value| Self::parse(value))
    }
}

fn new_span_id() -> String {
    // The low half of a v4 UUID always has the variant bit set, so it is never zero.
    format!("{:016x}", Uuid::new_v4().as_u128() as u64)
}

fn is_hex(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_valid_id(value: &str, len: usize) -> bool {
    value.len() == len && is_hex(value) && value.chars().any(|c| c != '0')
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn test_parse_and_format() {
        let ctx = TraceContext::parse(SAMPLE).unwrap();
        assert_eq!(ctx.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(ctx.span_id, "00f067aa0ba902b7");
        assert!(ctx.sampled);
        assert_eq!(ctx.to_traceparent(), SAMPLE);
    }

    #[test]
    fn test_rejects_malformed_headers() {
        assert!(TraceContext::parse("").is_none());
        assert!(TraceContext::parse("garbage").is_none());
        assert!(TraceContext::parse("00-4bf92f35-00f067aa0ba902b7-01").is_none());
        assert!(
            TraceContext::parse("00-00000000000000000000000000000000-00f067aa0ba902b7-01")
                .is_none()
        );
        assert!(
            TraceContext::parse("ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
                .is_none()
        );
        assert!(TraceContext::parse(&format!("{}-extra", SAMPLE)).is_none());
    }

    #[test]
    fn test_inject_extract() {
        let root = TraceContext::new_root();
        let mut carrier = TraceCarrier::new();
        root.inject(&mut carrier);

        let extracted = TraceContext::extract(&carrier).unwrap();
        assert_eq!(extracted, root);
        assert!(TraceContext::extract(&TraceCarrier::new()).is_none());
    }

    #[test]
    fn test_child_keeps_trace_id() {
        let root = TraceContext::new_root();
        let child = TraceContext::child_of(&root);
        assert_eq!(child.trace_id, root.trace_id);
        assert_ne!(child.span_id, root.span_id);
        assert_eq!(child.span_id.len(), 16);
        assert!(TraceContext::parse(&child.to_traceparent()).is_some());
    }
}
