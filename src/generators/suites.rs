//! The functional and stress test catalogues.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::compose::{EnvOverlay, TestCommand};
use crate::error::HarnessError;
use crate::host::MemInfo;
use crate::invoker::TestRequest;
use crate::matrix::WordSize;
use crate::session::Session;

use super::{elflink, elflink_and_share, elflink_rw, elflink_rw_and_share, elfshare};

/// A named group of tests selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TestSet {
    Functional,
    Stress,
}

impl TestSet {
    /// Every set, in the order a default run executes them.
    pub const ALL: [TestSet; 2] = [TestSet::Functional, TestSet::Stress];

    pub fn name(self) -> &'static str {
        match self {
            Self::Functional => "func",
            Self::Stress => "stress",
        }
    }
}

impl fmt::Display for TestSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown test set: {0} (expected func or stress)")]
pub struct UnknownTestSet(pub String);

impl FromStr for TestSet {
    type Err = UnknownTestSet;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "func" => Ok(Self::Functional),
            "stress" => Ok(Self::Stress),
            other => Err(UnknownTestSet(other.to_string())),
        }
    }
}

pub async fn run_test_set(session: &mut Session, set: TestSet) -> Result<(), HarnessError> {
    tracing::info!(test_set = %set, "starting test set");
    match set {
        TestSet::Functional => functional(session).await,
        TestSet::Stress => stress(session).await,
    }
}

/// Run each plain catalogue entry across every valid configuration.
async fn run_each(session: &mut Session, names: &[&str]) -> Result<(), HarnessError> {
    for name in names {
        session.run(&TestRequest::named(name)).await?;
    }
    Ok(())
}

fn with_env(line: &str, pairs: &[(&str, &str)]) -> TestRequest {
    TestRequest::named(line).with_env(EnvOverlay::from_pairs(pairs))
}

const PRELOAD: &str = "libhugetlbfs.so";
const PRELOAD_SHRINK: &str = "libhugetlbfs.so libheapshrink.so";

/// Functional catalogue, in the fixed order the tests must run.
pub async fn functional(session: &mut Session) -> Result<(), HarnessError> {
    // Background tests, no huge page support needed
    run_each(
        session,
        &["zero_filesize_segment", "test_root", "meminfo_nohuge"],
    )
    .await?;

    // Library tests needing kernel huge page support
    run_each(session, &["gethugepagesize", "gethugepagesizes"]).await?;
    session
        .run(&with_env("empty_mounts", &[("HUGETLB_VERBOSE", "1")]))
        .await?;
    session
        .run(&with_env("large_mounts", &[("HUGETLB_VERBOSE", "1")]))
        .await?;

    // Needs an active and usable mount
    run_each(
        session,
        &[
            "find_path",
            "unlinked_fd",
            "readback",
            "truncate",
            "shared",
            "mprotect",
            "mlock",
            "misalign",
        ],
    )
    .await?;

    // Kernel bug regressions
    run_each(
        session,
        &["ptrace-write-hugepage", "icache-hygiene", "slbpacaflush"],
    )
    .await?;
    for name in [
        "straddle_4GB",
        "huge_at_4GB_normal_below",
        "huge_below_4GB_normal_above",
    ] {
        session
            .run_for(&TestRequest::named(name), &[WordSize::W64])
            .await?;
    }
    run_each(
        session,
        &[
            "map_high_truncate_2",
            "misaligned_offset",
            "truncate_above_4GB",
            "brk_near_huge",
            "task-size-overrun",
            "stack_grow_into_huge",
        ],
    )
    .await?;

    // Copy-on-write and morecore
    run_each(session, &["private", "fork-cow", "direct", "malloc"]).await?;
    session
        .run(&with_env(
            "malloc",
            &[("LD_PRELOAD", PRELOAD), ("HUGETLB_MORECORE", "yes")],
        ))
        .await?;
    run_each(session, &["malloc_manysmall"]).await?;
    session
        .run(&with_env(
            "malloc_manysmall",
            &[("LD_PRELOAD", PRELOAD), ("HUGETLB_MORECORE", "yes")],
        ))
        .await?;
    for env in HEAPSHRINK_VARIANTS {
        session.run(&with_env("heapshrink", env)).await?;
    }
    session
        .run(&with_env(
            "heap-overflow",
            &[("HUGETLB_VERBOSE", "1"), ("HUGETLB_MORECORE", "yes")],
        ))
        .await?;

    // Remap and sharing families
    session.link_set().await?;
    elflink(session, &with_env("linkhuge_nofd", &[("HUGETLB_VERBOSE", "0")])).await?;
    elflink(session, &TestRequest::named("linkhuge")).await?;
    elfshare(session, &TestRequest::named("linkshare")).await?;
    elflink_and_share(session, &TestRequest::named("linkhuge")).await?;
    elflink_rw(session, &TestRequest::named("linkhuge_rw")).await?;
    elflink_rw_and_share(session, &TestRequest::named("linkhuge_rw")).await?;

    // Accounting regressions
    run_each(
        session,
        &[
            "chunk-overcommit",
            "alloc-instantiate-race shared",
            "alloc-instantiate-race private",
            "truncate_reserve_wraparound",
            "truncate_sigbus_versus_oom",
        ],
    )
    .await?;

    run_each(session, &["get_huge_pages", "shmoverride_linked"]).await?;
    session
        .run(&with_env("shmoverride_unlinked", &[("LD_PRELOAD", PRELOAD)]))
        .await?;
    run_each(session, &["quota.sh"]).await?;

    // Resizes the pool, keep last
    run_each(session, &["counters"]).await
}

const HEAPSHRINK_VARIANTS: [&[(&str, &str)]; 6] = [
    &[],
    &[("LD_PRELOAD", "libheapshrink.so")],
    &[("LD_PRELOAD", PRELOAD), ("HUGETLB_MORECORE", "yes")],
    &[("LD_PRELOAD", PRELOAD_SHRINK), ("HUGETLB_MORECORE", "yes")],
    &[
        ("LD_PRELOAD", "libheapshrink.so"),
        ("HUGETLB_MORECORE", "yes"),
        ("HUGETLB_MORECORE_SHRINK", "yes"),
    ],
    &[
        ("LD_PRELOAD", PRELOAD_SHRINK),
        ("HUGETLB_MORECORE", "yes"),
        ("HUGETLB_MORECORE_SHRINK", "yes"),
    ],
];

fn read_meminfo(session: &Session) -> MemInfo {
    let path = &session.settings().meminfo_path;
    MemInfo::read(path).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), "cannot read memory information: {}", e);
        MemInfo::default()
    })
}

/// Stress catalogue sized from the current huge page pool.
///
/// The free count is read once up front so pages the kernel fails to give
/// back between tests show up as failures.
pub async fn stress(session: &mut Session) -> Result<(), HarnessError> {
    let iterations = session.settings().stress_iterations;
    let threads = session.settings().shm_threads;
    let free = read_meminfo(session).hugepages_free;

    session
        .run(&TestRequest::new(
            TestCommand::new("mmap-gettest").arg(iterations).arg(free),
        ))
        .await?;
    // One page per thread plus one
    session
        .run(&TestRequest::new(
            TestCommand::new("mmap-cow")
                .arg(free.saturating_sub(1))
                .arg(free),
        ))
        .await?;

    let pool = read_meminfo(session).pool_bytes();
    session.ensure_running()?;
    let guard = match session.limits().acquire(pool) {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing::warn!("shared memory limits not adjusted: {}", e);
            None
        }
    };

    let result = async {
        // Half the pool first to catch off-by-one allocation failures
        if free > 1 {
            session
                .run(&TestRequest::new(
                    TestCommand::new("shm-fork.sh").arg(threads).arg(free / 2),
                ))
                .await?;
        }
        session
            .run(&TestRequest::new(
                TestCommand::new("shm-fork.sh").arg(threads).arg(free),
            ))
            .await?;
        session
            .run(&TestRequest::new(
                TestCommand::new("shm-getraw.sh").arg(free).arg("/dev/full"),
            ))
            .await
    }
    .await;

    if let Some(guard) = guard {
        if let Err(e) = guard.restore() {
            tracing::warn!("shared memory limits not restored: {}", e);
        }
    }
    result
}
