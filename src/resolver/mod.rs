//! Configuration resolver: which (page size, word size) pairs are usable on
//! this host, and which word sizes are safe for remap-sensitive tests.
//!
//! Every probe failure is non-fatal. It only narrows the tables and is
//! reported as a diagnostic.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::compose::{EnvOverlay, EnvironmentComposer, Invocation, TestCommand};
use crate::invoker::{CommandRunner, RunStatus};
use crate::matrix::{PageSize, WordSize};

/// Helper that lists page sizes with an active mount and free pages.
pub const PAGE_SIZE_TOOL: &str = "hugeadm";
/// Helper that prints a usable mount path for the current environment.
pub const MOUNT_PROBE_TOOL: &str = "get_hugetlbfs_path";
/// Compiler driver queried for its default linker script.
pub const LINKER_PROBE_TOOL: &str = "gcc";
/// Linker script marker of toolchains that break segment remapping.
pub const LINKER_MARKER: &str = "SPECIAL";

/// Word sizes confirmed usable per page size.
///
/// A page size with no usable word size keeps an empty entry so callers
/// skip it uniformly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidityTable {
    entries: BTreeMap<PageSize, BTreeSet<WordSize>>,
}

impl ValidityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table directly, bypassing host discovery.
    pub fn from_entries<I, W>(entries: I) -> Self
    where
        I: IntoIterator<Item = (PageSize, W)>,
        W: IntoIterator<Item = WordSize>,
    {
        let entries = entries
            .into_iter()
            .map(|(page, words)| (page, words.into_iter().collect()))
            .collect();
        Self { entries }
    }

    pub fn insert(&mut self, page: PageSize, words: BTreeSet<WordSize>) {
        self.entries.insert(page, words);
    }

    /// Page sizes in ascending order.
    pub fn page_sizes(&self) -> Vec<PageSize> {
        self.entries.keys().copied().collect()
    }

    pub fn words_for(&self, page: PageSize) -> Option<&BTreeSet<WordSize>> {
        self.entries.get(&page)
    }

    pub fn is_valid(&self, page: PageSize, word: WordSize) -> bool {
        self.entries.get(&page).is_some_and(|w| w.contains(&word))
    }

    pub fn iter(&self) -> impl Iterator<Item = (PageSize, &BTreeSet<WordSize>)> {
        self.entries.iter().map(|(page, words)| (*page, words))
    }
}

/// Word sizes whose toolchain is safe for remap-sensitive tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkCompatibilitySet(BTreeSet<WordSize>);

impl LinkCompatibilitySet {
    pub fn contains(&self, word: WordSize) -> bool {
        self.0.contains(&word)
    }

    pub fn iter(&self) -> impl Iterator<Item = WordSize> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<WordSize> for LinkCompatibilitySet {
    fn from_iter<T: IntoIterator<Item = WordSize>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Mount points discovered during probing, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountRegistry(Vec<PathBuf>);

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mount point; duplicates are ignored.
    pub fn register(&mut self, mount: impl Into<PathBuf>) {
        let mount = mount.into();
        if !self.0.contains(&mount) {
            self.0.push(mount);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.0.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<PathBuf> for MountRegistry {
    fn from_iter<T: IntoIterator<Item = PathBuf>>(iter: T) -> Self {
        let mut registry = Self::new();
        for mount in iter {
            registry.register(mount);
        }
        registry
    }
}

/// Output of host discovery.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub validity: ValidityTable,
    pub mounts: MountRegistry,
}

impl Resolution {
    pub fn page_sizes(&self) -> Vec<PageSize> {
        self.validity.page_sizes()
    }
}

/// Probes the host through helper programs.
pub struct Resolver {
    runner: Arc<dyn CommandRunner>,
    composer: EnvironmentComposer,
}

impl Resolver {
    pub fn new(runner: Arc<dyn CommandRunner>, composer: EnvironmentComposer) -> Self {
        Self { runner, composer }
    }

    /// Page sizes with an active mount and at least one free page.
    pub async fn discover_page_sizes(&self) -> BTreeSet<PageSize> {
        let invocation = self.composer.compose(
            None,
            None,
            &EnvOverlay::new(),
            &TestCommand::new(PAGE_SIZE_TOOL).arg("--page-sizes"),
        );
        let done = self.runner.run(&invocation).await;
        if done.status != RunStatus::Exited(0) {
            tracing::warn!(status = ?done.status, "{} --page-sizes failed, no page sizes discovered", PAGE_SIZE_TOOL);
            return BTreeSet::new();
        }
        parse_page_sizes(&done.output)
    }

    /// Build the validity table and mount registry.
    ///
    /// `requested` replaces discovery when given.
    pub async fn resolve(
        &self,
        word_sizes: &[WordSize],
        requested: Option<&[PageSize]>,
    ) -> Resolution {
        let pages: BTreeSet<PageSize> = match requested {
            Some(pages) => pages.iter().copied().collect(),
            None => self.discover_page_sizes().await,
        };

        let mut resolution = Resolution::default();
        for page in pages {
            let mut ok = BTreeSet::new();
            for &word in word_sizes {
                if let Some(mount) = self.probe_mount(page, word).await {
                    ok.insert(word);
                    resolution.mounts.register(mount);
                }
            }
            if ok.is_empty() {
                tracing::warn!("No mountpoints available for page size {}", page);
            } else {
                for word in word_sizes.iter().filter(|w| !ok.contains(w)) {
                    tracing::warn!(
                        "The {} bit word size is not compatible with {} pages",
                        word,
                        page
                    );
                }
            }
            resolution.validity.insert(page, ok);
        }
        resolution
    }

    /// Mount path usable for (page, word), if the helper finds one.
    async fn probe_mount(&self, page: PageSize, word: WordSize) -> Option<PathBuf> {
        let invocation = self.composer.compose(
            Some(word),
            Some(page),
            &EnvOverlay::new(),
            &TestCommand::new(MOUNT_PROBE_TOOL),
        );
        let done = self.runner.run(&invocation).await;
        match done.status {
            RunStatus::Exited(0) => {
                let path = Path::new(done.output.lines().next().unwrap_or_default().trim());
                // Sharing cleanup removes trees under the mount.
                if !path.is_absolute() {
                    tracing::warn!(
                        page_size = page.bytes(),
                        word_size = word.bits(),
                        "{} reported unusable mount {:?}",
                        MOUNT_PROBE_TOOL,
                        path
                    );
                    return None;
                }
                tracing::debug!(page_size = page.bytes(), word_size = word.bits(), mount = %path.display(), "mount probe ok");
                Some(path.to_path_buf())
            }
            status => {
                tracing::debug!(page_size = page.bytes(), word_size = word.bits(), ?status, "mount probe failed");
                None
            }
        }
    }

    /// Word sizes whose linker does not emit the known-bad marker.
    ///
    /// A toolchain that cannot be queried is assumed compatible.
    pub async fn probe_link_compatibility(&self, word_sizes: &[WordSize]) -> LinkCompatibilitySet {
        let mut compatible = LinkCompatibilitySet::default();
        for &word in word_sizes {
            let invocation = linker_probe(self.composer.work_dir(), word);
            let done = self.runner.run(&invocation).await;
            if done.output.contains(LINKER_MARKER) {
                tracing::warn!(
                    "linker for {}-bit is incompatible with segment remapping, remap tests will be skipped",
                    word
                );
            } else {
                compatible.0.insert(word);
            }
        }
        compatible
    }
}

/// `gcc -m<W> -Wl,--verbose`, run with the caller's own environment.
fn linker_probe(work_dir: &Path, word: WordSize) -> Invocation {
    Invocation {
        program: LINKER_PROBE_TOOL.to_string(),
        args: vec![format!("-m{}", word.bits()), "-Wl,--verbose".to_string()],
        env: EnvOverlay::new(),
        current_dir: work_dir.to_path_buf(),
    }
}

/// Parse one page size per line, ignoring lines that are not numbers.
pub fn parse_page_sizes(output: &str) -> BTreeSet<PageSize> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| match line.parse::<u64>().ok().and_then(PageSize::new) {
            Some(page) => Some(page),
            None => {
                tracing::warn!(line = %line, "ignoring unparsable page size");
                None
            }
        })
        .collect()
}
