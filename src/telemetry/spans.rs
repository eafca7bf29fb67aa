//! Span utilities for test invocations.

use tracing::{info_span, Span};

use crate::matrix::{Outcome, PageSize, WordSize};

/// Extension trait for recording invocation results into a span.
pub trait SpanExt {
    /// Record the classified outcome and raw exit status.
    fn record_outcome(&self, outcome: Outcome, exit_code: Option<i32>);
}

impl SpanExt for Span {
    fn record_outcome(&self, outcome: Outcome, exit_code: Option<i32>) {
        self.record("outcome", outcome.title());
        self.record("status", if outcome.is_success() { "ok" } else { "error" });
        if let Some(code) = exit_code {
            self.record("exit_code", code);
        }
    }
}

/// Factory for per-invocation spans.
pub struct InvocationSpan;

impl InvocationSpan {
    /// Create a span for one test run.
    ///
    /// `outcome`, `status` and `exit_code` are filled in by
    /// `SpanExt::record_outcome` once the run completes.
    pub fn new(command: &str, page: PageSize, word: WordSize) -> Span {
        info_span!(
            "test_invocation",
            command = %command,
            page_size = page.bytes(),
            word_size = word.bits(),
            outcome = tracing::field::Empty,
            status = tracing::field::Empty,
            exit_code = tracing::field::Empty,
        )
    }
}
