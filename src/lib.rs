//! hugetest-matrix
//!
//! Test-matrix driver for a huge page library test suite. It discovers which
//! page sizes and word sizes are usable on the host, runs every test of the
//! selected sets once per valid combination, classifies each exit status, and
//! reports the counts as a page size x word size matrix.
//!
//! # Layout
//!
//! - [`resolver`]: host probes producing the validity table and mount list
//! - [`compose`]: pure environment and command composition
//! - [`invoker`]: subprocess execution and outcome recording
//! - [`generators`]: remap/sharing permutation families and the catalogues
//! - [`lifecycle`]: shared memory limits and sharing artifact cleanup
//! - [`matrix`]: outcome counters and the summary table
//!
//! Execution is strictly sequential. One subprocess runs at a time, and an
//! interrupt kills it and unwinds the rest of the run.

pub mod cli;
pub mod compose;
pub mod config;
pub mod error;
pub mod generators;
pub mod host;
pub mod invoker;
pub mod lifecycle;
pub mod matrix;
pub mod resolver;
pub mod session;
pub mod shutdown;
pub mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cli::RunOptions;
use compose::{EnvironmentComposer, Verbosity};
use config::EnvConfig;
use error::HarnessError;
use generators::{run_test_set, TestSet};
use host::HostIdentity;
use invoker::{CommandRunner, TestInvoker};
use lifecycle::LimitManager;
use matrix::{PageSize, ResultMatrix, WordSize};
use resolver::Resolver;
use session::{Session, SuiteSettings};

/// Everything a run needs, after CLI and configuration layering.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Directory holding the per-word-size build output; children run here.
    pub root: PathBuf,
    pub verbosity: Verbosity,
    pub test_sets: Vec<TestSet>,
    pub word_sizes: Vec<WordSize>,
    /// Explicit page sizes; `None` discovers them on the host.
    pub page_sizes: Option<Vec<PageSize>>,
    pub limit_files: Vec<PathBuf>,
    pub suite: SuiteSettings,
    pub identity: Option<HostIdentity>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let env = EnvConfig::default();
        Self {
            root: env.root.clone(),
            verbosity: Verbosity::default(),
            test_sets: TestSet::ALL.to_vec(),
            word_sizes: WordSize::ALL.to_vec(),
            page_sizes: None,
            limit_files: env.limit_files(),
            suite: env.suite_settings(),
            identity: None,
        }
    }
}

impl HarnessConfig {
    /// Combine layered configuration with command-line options.
    pub fn from_parts(env: &EnvConfig, opts: &RunOptions, identity: Option<HostIdentity>) -> Self {
        Self {
            root: env.root.clone(),
            verbosity: opts.verbosity(),
            test_sets: opts.selected_test_sets(),
            word_sizes: opts.selected_word_sizes(),
            page_sizes: opts.requested_page_sizes(),
            limit_files: env.limit_files(),
            suite: env.suite_settings(),
            identity,
        }
    }

    fn is_privileged(&self) -> bool {
        self.identity.is_some_and(|id| id.is_privileged())
    }
}

/// Result of a run: the matrix, plus the error that cut it short, if any.
#[derive(Debug)]
pub struct RunReport {
    pub matrix: ResultMatrix,
    pub aborted: Option<HarnessError>,
}

impl RunReport {
    pub fn is_interrupted(&self) -> bool {
        self.aborted.as_ref().is_some_and(HarnessError::is_interrupt)
    }
}

/// Resolve the host, then run each selected test set in order.
///
/// Test outcomes never fail the run. The only early stop is an interrupt,
/// which is returned in the report together with the partial matrix.
pub async fn run_harness(
    config: &HarnessConfig,
    runner: Arc<dyn CommandRunner>,
    cancel: CancellationToken,
) -> RunReport {
    let composer = EnvironmentComposer::new(config.verbosity, &config.root);
    let resolver = Resolver::new(runner.clone(), composer.clone());
    let resolution = resolver
        .resolve(&config.word_sizes, config.page_sizes.as_deref())
        .await;
    tracing::info!(
        page_sizes = resolution.page_sizes().len(),
        mounts = resolution.mounts.len(),
        "host resolved"
    );

    if cancel.is_cancelled() {
        tracing::warn!("interrupted during host discovery");
        return RunReport {
            matrix: ResultMatrix::new(&resolution.page_sizes()),
            aborted: Some(HarnessError::Interrupted),
        };
    }

    let invoker = TestInvoker::new(runner, composer, cancel);
    let limits = LimitManager::new(config.limit_files.clone(), config.is_privileged());
    let mut session = Session::new(invoker, resolver, resolution, config.word_sizes.clone())
        .with_limits(limits)
        .with_uid(config.identity.map(|id| id.uid))
        .with_settings(config.suite.clone());

    let mut aborted = None;
    for &set in &config.test_sets {
        let result = match session.ensure_running() {
            Ok(()) => run_test_set(&mut session, set).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(test_set = %set, "{}", e);
            aborted = Some(e);
            break;
        }
    }

    RunReport {
        matrix: session.into_matrix(),
        aborted,
    }
}
