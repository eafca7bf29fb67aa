//! Result matrix: outcome counters indexed by page size and word size.
//!
//! The matrix is a pure accumulator. Every cell starts at zero and the only
//! mutation is `record`, which bumps `total` and exactly one outcome counter.

mod summary;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

pub use summary::{pretty_page_size, render_summary};

/// CPU register width a test binary is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WordSize {
    W32,
    W64,
}

impl WordSize {
    /// Every supported word size, ascending.
    pub const ALL: [WordSize; 2] = [WordSize::W32, WordSize::W64];

    pub fn bits(self) -> u32 {
        match self {
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(Self::W32),
            64 => Some(Self::W64),
            _ => None,
        }
    }

    /// Name of the build output directory for this word size (`obj32`, `obj64`).
    pub fn obj_dir(self) -> String {
        format!("obj{}", self.bits())
    }
}

impl fmt::Display for WordSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// A huge page granularity in bytes. Always nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageSize(u64);

impl PageSize {
    pub fn new(bytes: u64) -> Option<Self> {
        (bytes > 0).then_some(Self(bytes))
    }

    pub fn bytes(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&pretty_page_size(self.0))
    }
}

/// Classified result of one test invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    ConfigError,
    Fail,
    ExpectedFail,
    UnexpectedPass,
    Signal,
    Skipped,
    Strange,
    Interrupted,
}

impl Outcome {
    pub const ALL: [Outcome; 9] = [
        Outcome::Pass,
        Outcome::ConfigError,
        Outcome::Fail,
        Outcome::ExpectedFail,
        Outcome::UnexpectedPass,
        Outcome::Signal,
        Outcome::Skipped,
        Outcome::Strange,
        Outcome::Interrupted,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Row title used in the text summary.
    pub fn title(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::ConfigError => "Bad configuration",
            Self::Fail => "FAIL",
            Self::ExpectedFail => "Expected FAIL",
            Self::UnexpectedPass => "Unexpected PASS",
            Self::Signal => "Killed by signal",
            Self::Skipped => "Skipped",
            Self::Strange => "Strange test result",
            Self::Interrupted => "Interrupted",
        }
    }

    /// Whether this outcome counts as a clean result.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Pass | Self::ExpectedFail | Self::Skipped)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Exit status predicate used by the classification table.
#[derive(Debug, Clone, Copy)]
enum ExitMatch {
    Exactly(i32),
    Above(i32),
}

impl ExitMatch {
    fn matches(self, code: i32) -> bool {
        match self {
            Self::Exactly(c) => code == c,
            Self::Above(c) => code > c,
        }
    }
}

/// Exit status contract of the tested executables, evaluated in order.
/// Anything that falls through is `Strange`.
const CLASSIFICATION: &[(ExitMatch, Outcome)] = &[
    (ExitMatch::Exactly(0), Outcome::Pass),
    (ExitMatch::Exactly(1), Outcome::ConfigError),
    (ExitMatch::Exactly(2), Outcome::Fail),
    (ExitMatch::Exactly(3), Outcome::ExpectedFail),
    (ExitMatch::Exactly(4), Outcome::UnexpectedPass),
    (ExitMatch::Above(127), Outcome::Signal),
];

/// Map an exit status to its outcome.
pub fn classify(code: i32) -> Outcome {
    CLASSIFICATION
        .iter()
        .find(|(rule, _)| rule.matches(code))
        .map_or(Outcome::Strange, |&(_, outcome)| outcome)
}

/// Counters for one (page size, word size) cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellCounts {
    total: u64,
    by_outcome: [u64; Outcome::ALL.len()],
}

impl CellCounts {
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn get(&self, outcome: Outcome) -> u64 {
        self.by_outcome[outcome.index()]
    }

    /// `total` equals the sum of every outcome counter.
    pub fn is_consistent(&self) -> bool {
        self.by_outcome.iter().sum::<u64>() == self.total
    }

    fn bump(&mut self, outcome: Outcome) {
        self.total += 1;
        self.by_outcome[outcome.index()] += 1;
    }
}

/// Outcome counters for every page size and word size of a run.
#[derive(Debug, Clone, Default)]
pub struct ResultMatrix {
    page_sizes: Vec<PageSize>,
    cells: BTreeMap<(PageSize, WordSize), CellCounts>,
}

impl ResultMatrix {
    /// Create a zeroed matrix covering `page_sizes` x every word size.
    pub fn new(page_sizes: &[PageSize]) -> Self {
        let mut matrix = Self::default();
        for &page in page_sizes {
            matrix.add_page_size(page);
        }
        matrix
    }

    fn add_page_size(&mut self, page: PageSize) {
        if self.page_sizes.contains(&page) {
            return;
        }
        self.page_sizes.push(page);
        for word in WordSize::ALL {
            self.cells.entry((page, word)).or_default();
        }
    }

    /// Page sizes in column order.
    pub fn page_sizes(&self) -> &[PageSize] {
        &self.page_sizes
    }

    /// Count one classified run.
    pub fn record(&mut self, page: PageSize, word: WordSize, outcome: Outcome) {
        self.add_page_size(page);
        if let Some(cell) = self.cells.get_mut(&(page, word)) {
            cell.bump(outcome);
        }
    }

    pub fn cell(&self, page: PageSize, word: WordSize) -> CellCounts {
        self.cells.get(&(page, word)).copied().unwrap_or_default()
    }

    pub fn count(&self, outcome: Outcome, page: PageSize, word: WordSize) -> u64 {
        self.cell(page, word).get(outcome)
    }

    pub fn total(&self, page: PageSize, word: WordSize) -> u64 {
        self.cell(page, word).total()
    }

    /// Sum of `total` over every cell.
    pub fn grand_total(&self) -> u64 {
        self.cells.values().map(CellCounts::total).sum()
    }

    /// Sum of one outcome over every cell.
    pub fn outcome_total(&self, outcome: Outcome) -> u64 {
        self.cells.values().map(|c| c.get(outcome)).sum()
    }

    pub fn is_consistent(&self) -> bool {
        self.cells.values().all(CellCounts::is_consistent)
    }

    /// Serializable view used for `--json` output.
    pub fn report(&self) -> MatrixReport {
        let cells = self
            .page_sizes
            .iter()
            .flat_map(|&page| WordSize::ALL.map(|word| (page, word)))
            .map(|(page, word)| {
                let counts = self.cell(page, word);
                CellReport {
                    page_size: page.bytes(),
                    word_size: word.bits(),
                    total: counts.total(),
                    outcomes: Outcome::ALL
                        .iter()
                        .map(|&o| (o, counts.get(o)))
                        .collect(),
                }
            })
            .collect();
        MatrixReport {
            page_sizes: self.page_sizes.iter().map(|p| p.bytes()).collect(),
            cells,
        }
    }
}

/// JSON form of a [`ResultMatrix`].
#[derive(Debug, Clone, Serialize)]
pub struct MatrixReport {
    pub page_sizes: Vec<u64>,
    pub cells: Vec<CellReport>,
}

/// JSON form of one matrix cell.
#[derive(Debug, Clone, Serialize)]
pub struct CellReport {
    pub page_size: u64,
    pub word_size: u32,
    pub total: u64,
    pub outcomes: BTreeMap<Outcome, u64>,
}
