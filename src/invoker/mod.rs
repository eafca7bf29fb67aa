//! Test invoker: runs one logical request per applicable configuration and
//! records the classified outcome.
//!
//! Two primitive operations exist, execute-and-classify and record-as-skipped.
//! `run_across` and `run_remap_gated` expand a request over the validity
//! table. The result matrix is passed in explicitly by the caller.

mod process;

use std::io::Write;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::compose::{combine, EnvOverlay, EnvironmentComposer, TestCommand};
use crate::error::HarnessError;
use crate::matrix::{Outcome, PageSize, ResultMatrix, WordSize};
use crate::resolver::{LinkCompatibilitySet, ValidityTable};
use crate::telemetry::{InvocationSpan, SpanExt};

pub use process::{
    CommandRunner, Completion, ProcessRunner, RunStatus, SPAWN_FAILURE_STATUS,
};

/// Binary layout a remap test was linked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    B,
    Bdt,
}

impl LinkMode {
    pub const ALL: [LinkMode; 2] = [LinkMode::B, LinkMode::Bdt];

    /// Program name prefix of binaries built in this mode.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::B => "xB.",
            Self::Bdt => "xBDT.",
        }
    }
}

/// One logical test: a command plus its extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRequest {
    pub command: TestCommand,
    pub env: EnvOverlay,
    pub label: Option<String>,
}

impl TestRequest {
    pub fn new(command: TestCommand) -> Self {
        Self {
            command,
            env: EnvOverlay::new(),
            label: None,
        }
    }

    /// Shorthand for a catalogue line such as `"mlock"`.
    pub fn named(line: &str) -> Self {
        Self::new(TestCommand::parse(line))
    }

    pub fn with_env(mut self, env: EnvOverlay) -> Self {
        self.env = env;
        self
    }

    pub fn labelled(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Same request against the binary linked in `mode`.
    pub fn linked(&self, mode: LinkMode) -> Self {
        Self {
            command: self.command.prefixed(mode.prefix()),
            ..self.clone()
        }
    }

    /// Text printed before the result of each run.
    fn describe(&self, page: PageSize, word: WordSize) -> String {
        let head = combine(self.label.as_deref().unwrap_or_default(), &self.env.to_string());
        combine(&head, &format!("{} ({}: {}):", self.command, page, word))
    }
}

/// Executes requests and feeds outcomes into a [`ResultMatrix`].
pub struct TestInvoker {
    runner: Arc<dyn CommandRunner>,
    composer: EnvironmentComposer,
    cancel: CancellationToken,
}

impl TestInvoker {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        composer: EnvironmentComposer,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            runner,
            composer,
            cancel,
        }
    }

    /// `Err(Interrupted)` once the run has been cancelled.
    pub fn ensure_running(&self) -> Result<(), HarnessError> {
        if self.cancel.is_cancelled() {
            return Err(HarnessError::Interrupted);
        }
        Ok(())
    }

    /// Run `request` once for (page, word) and record the outcome.
    ///
    /// Returns `Ok(None)` without touching the matrix when no binaries were
    /// built for `word`. An interrupted run is recorded, then reported as
    /// `HarnessError::Interrupted` so the caller stops its sequence.
    pub async fn execute(
        &self,
        matrix: &mut ResultMatrix,
        page: PageSize,
        word: WordSize,
        request: &TestRequest,
    ) -> Result<Option<Outcome>, HarnessError> {
        self.ensure_running()?;
        if !self.composer.obj_dir(word).is_dir() {
            tracing::debug!(word_size = %word, command = %request.command, "no build output, not run");
            return Ok(None);
        }

        let invocation =
            self.composer
                .compose(Some(word), Some(page), &request.env, &request.command);
        print!("{}\t", request.describe(page, word));
        let _ = std::io::stdout().flush();

        let span = InvocationSpan::new(&request.command.to_string(), page, word);
        let completion = self
            .runner
            .run(&invocation)
            .instrument(span.clone())
            .await;
        println!("{}", completion.output);

        let outcome = completion.status.outcome();
        span.record_outcome(outcome, completion.status.exit_code());
        matrix.record(page, word, outcome);

        if outcome == Outcome::Interrupted {
            return Err(HarnessError::Interrupted);
        }
        Ok(Some(outcome))
    }

    /// Count `request` as skipped for (page, word) without running it.
    pub fn record_skipped(
        &self,
        matrix: &mut ResultMatrix,
        page: PageSize,
        word: WordSize,
        request: &TestRequest,
    ) {
        matrix.record(page, word, Outcome::Skipped);
        println!("{}\tSKIPPED", request.describe(page, word));
    }

    /// Run `request` for every page size and every word size that is both in
    /// `candidates` and valid for that page size.
    pub async fn run_across(
        &self,
        matrix: &mut ResultMatrix,
        validity: &ValidityTable,
        candidates: &[WordSize],
        request: &TestRequest,
    ) -> Result<(), HarnessError> {
        for (page, valid) in validity.iter() {
            for word in valid.iter().filter(|w| candidates.contains(w)) {
                self.execute(matrix, page, *word, request).await?;
            }
        }
        Ok(())
    }

    /// Like `run_across`, but word sizes outside `link` are recorded as
    /// skipped instead of executed.
    pub async fn run_remap_gated(
        &self,
        matrix: &mut ResultMatrix,
        validity: &ValidityTable,
        candidates: &[WordSize],
        link: &LinkCompatibilitySet,
        request: &TestRequest,
    ) -> Result<(), HarnessError> {
        for (page, valid) in validity.iter() {
            for &word in valid.iter().filter(|w| candidates.contains(w)) {
                if link.contains(word) {
                    self.execute(matrix, page, word, request).await?;
                } else {
                    self.record_skipped(matrix, page, word, request);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "invoker_tests.rs"]
mod tests;
