//! Telemetry for the test driver.
//!
//! Structured diagnostics go through `tracing`; the progress lines and the
//! summary table are program output and are printed directly.

mod logging;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use spans::{InvocationSpan, SpanExt};
