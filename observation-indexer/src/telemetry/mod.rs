//! Trace propagation and best-effort side effects.

mod trace_context;

pub use trace_context::{TraceContext, TRACEPARENT};

use std::fmt::Display;
use tracing::warn;

/// Run the outcome of a best-effort side effect through one policy: log the
/// failure and carry on.
///
/// Used for signals that must never fail the request or job that produced
/// them, such as queue-depth sampling.
///
/// # Returns
///
/// The success value, or `None` after logging a warning.
pub fn non_fatal<T, E: Display>(label: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(side_effect = label, error = %e, "Non-fatal side effect failed");
            None
        }
    }
}
