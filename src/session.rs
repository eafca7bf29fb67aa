//! Orchestration context owning the result matrix for one run.
//!
//! Generators and catalogues drive everything through a `&mut Session`; the
//! matrix is never shared or global.

use std::path::PathBuf;

use crate::error::HarnessError;
use crate::invoker::{TestInvoker, TestRequest};
use crate::lifecycle::{ArtifactCleaner, CleanupStats, LimitManager};
use crate::matrix::{ResultMatrix, WordSize};
use crate::resolver::{LinkCompatibilitySet, Resolution, Resolver, ValidityTable};

/// Knobs used by the stress catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteSettings {
    pub meminfo_path: PathBuf,
    pub stress_iterations: u32,
    pub shm_threads: u32,
}

impl Default for SuiteSettings {
    fn default() -> Self {
        Self {
            meminfo_path: PathBuf::from("/proc/meminfo"),
            stress_iterations: 10,
            shm_threads: 10,
        }
    }
}

pub struct Session {
    invoker: TestInvoker,
    resolver: Resolver,
    matrix: ResultMatrix,
    validity: ValidityTable,
    word_sizes: Vec<WordSize>,
    link: Option<LinkCompatibilitySet>,
    limits: LimitManager,
    cleaner: ArtifactCleaner,
    settings: SuiteSettings,
}

impl Session {
    /// Start a session over a resolved host.
    ///
    /// Limits default to an empty, unprivileged manager and artifact cleanup
    /// to an unknown user; see `with_limits` and `with_uid`.
    pub fn new(
        invoker: TestInvoker,
        resolver: Resolver,
        resolution: Resolution,
        word_sizes: Vec<WordSize>,
    ) -> Self {
        let matrix = ResultMatrix::new(&resolution.page_sizes());
        Self {
            invoker,
            resolver,
            matrix,
            validity: resolution.validity,
            word_sizes,
            link: None,
            limits: LimitManager::new(Vec::new(), false),
            cleaner: ArtifactCleaner::new(resolution.mounts, None),
            settings: SuiteSettings::default(),
        }
    }

    pub fn with_limits(mut self, limits: LimitManager) -> Self {
        self.limits = limits;
        self
    }

    /// Owner of the sharing directories to clear.
    pub fn with_uid(mut self, uid: Option<u32>) -> Self {
        self.cleaner = ArtifactCleaner::new(self.cleaner.mounts().clone(), uid);
        self
    }

    pub fn with_settings(mut self, settings: SuiteSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use a known link compatibility set instead of probing the toolchain.
    pub fn with_link_set(mut self, link: LinkCompatibilitySet) -> Self {
        self.link = Some(link);
        self
    }

    pub fn matrix(&self) -> &ResultMatrix {
        &self.matrix
    }

    pub fn into_matrix(self) -> ResultMatrix {
        self.matrix
    }

    pub fn validity(&self) -> &ValidityTable {
        &self.validity
    }

    pub fn word_sizes(&self) -> &[WordSize] {
        &self.word_sizes
    }

    pub fn limits(&self) -> &LimitManager {
        &self.limits
    }

    pub fn settings(&self) -> &SuiteSettings {
        &self.settings
    }

    /// Run `request` on every valid (page size, word size) pair.
    pub async fn run(&mut self, request: &TestRequest) -> Result<(), HarnessError> {
        let words = self.word_sizes.clone();
        self.run_for(request, &words).await
    }

    /// Run `request` only for the word sizes in `words`.
    pub async fn run_for(
        &mut self,
        request: &TestRequest,
        words: &[WordSize],
    ) -> Result<(), HarnessError> {
        self.invoker
            .run_across(&mut self.matrix, &self.validity, words, request)
            .await
    }

    /// Run a remap-sensitive request, skipping word sizes whose toolchain is
    /// known to break remapping.
    pub async fn run_remap_gated(&mut self, request: &TestRequest) -> Result<(), HarnessError> {
        let link = self.link_set().await?.clone();
        self.invoker
            .run_remap_gated(
                &mut self.matrix,
                &self.validity,
                &self.word_sizes,
                &link,
                request,
            )
            .await
    }

    /// Stop with `HarnessError::Interrupted` once the run is cancelled.
    pub fn ensure_running(&self) -> Result<(), HarnessError> {
        self.invoker.ensure_running()
    }

    /// Link compatibility set, probed on first use.
    ///
    /// A probe cut short by an interrupt is not cached.
    pub async fn link_set(&mut self) -> Result<&LinkCompatibilitySet, HarnessError> {
        if self.link.is_none() {
            self.ensure_running()?;
            let probed = self
                .resolver
                .probe_link_compatibility(&self.word_sizes)
                .await;
            self.ensure_running()?;
            self.link = Some(probed);
        }
        Ok(self.link.get_or_insert_with(LinkCompatibilitySet::default))
    }

    /// Remove segment-sharing artifacts from every known mount.
    pub fn clear_artifacts(&self) -> CleanupStats {
        self.cleaner.clear()
    }
}
