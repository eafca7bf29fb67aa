//! Combinatorial generators for the remap and segment-sharing families.
//!
//! Each generator expands one base request into the fixed permutation set its
//! family needs. Sharing generators bracket their runs with artifact cleanup
//! so each clean window starts from an empty sharing directory; the closing
//! cleanup runs even when the window is cut short.

mod suites;

use crate::compose::EnvOverlay;
use crate::error::HarnessError;
use crate::invoker::{LinkMode, TestRequest};
use crate::session::Session;

pub use suites::{functional, run_test_set, stress, TestSet, UnknownTestSet};

/// Remap directives with a meaningful mapping.
const ELFMAP_MODES: [&str; 3] = ["R", "W", "RW"];

/// `base` with `pairs` set ahead of the base's own environment.
fn variant(base: &TestRequest, pairs: &[(&str, &str)]) -> TestRequest {
    let env = EnvOverlay::from_pairs(pairs).combine(&base.env);
    base.clone().with_env(env)
}

/// Remap test: plain, preloaded, then each link mode as is, with minimal
/// copy off, and with remapping off. The link-mode runs are remap-gated.
pub async fn elflink(session: &mut Session, base: &TestRequest) -> Result<(), HarnessError> {
    session.run(base).await?;
    // Not linked for remapping, must not blow up either.
    session
        .run(&variant(base, &[("LD_PRELOAD", "libhugetlbfs.so")]))
        .await?;

    let minimal_copy_off = variant(base, &[("HUGETLB_MINIMAL_COPY", "no")]);
    let remap_off = variant(base, &[("HUGETLB_ELFMAP", "no")]);
    for request in [base, &minimal_copy_off, &remap_off] {
        for mode in LinkMode::ALL {
            session.run_remap_gated(&request.linked(mode)).await?;
        }
    }
    Ok(())
}

/// Read/write remap test: every remap directive, then R/W/RW again with
/// minimal copy off. Never gated.
pub async fn elflink_rw(session: &mut Session, base: &TestRequest) -> Result<(), HarnessError> {
    session.run(base).await?;
    for mode in ELFMAP_MODES.into_iter().chain(["no"]) {
        session
            .run(&variant(base, &[("HUGETLB_ELFMAP", mode)]))
            .await?;
    }
    for mode in ELFMAP_MODES {
        session
            .run(&variant(
                base,
                &[("HUGETLB_MINIMAL_COPY", "no"), ("HUGETLB_ELFMAP", mode)],
            ))
            .await?;
    }
    Ok(())
}

/// Segment sharing: each link mode in its own clean window, then both modes
/// back to back so the second reuses the first one's artifact.
pub async fn elfshare(session: &mut Session, base: &TestRequest) -> Result<(), HarnessError> {
    let shared = variant(base, &[("HUGETLB_SHARE", "1")]);
    let [b, bdt] = LinkMode::ALL.map(|mode| shared.linked(mode));

    session.clear_artifacts();
    let result = async {
        session.run_remap_gated(&b).await?;
        session.clear_artifacts();
        session.run_remap_gated(&bdt).await?;
        session.clear_artifacts();
        session.run_remap_gated(&b).await?;
        session.run_remap_gated(&bdt).await
    }
    .await;
    session.clear_artifacts();
    result
}

/// Remap plus sharing: per link mode, create then reuse the artifact inside
/// one clean window.
pub async fn elflink_and_share(
    session: &mut Session,
    base: &TestRequest,
) -> Result<(), HarnessError> {
    let shared = variant(base, &[("HUGETLB_SHARE", "1")]);

    session.clear_artifacts();
    for mode in LinkMode::ALL {
        let request = shared.linked(mode);
        let result = async {
            session.run_remap_gated(&request).await?;
            session.run_remap_gated(&request).await
        }
        .await;
        session.clear_artifacts();
        result?;
    }
    Ok(())
}

/// Read/write remap plus sharing: per remap directive, create then reuse the
/// artifact inside one clean window.
pub async fn elflink_rw_and_share(
    session: &mut Session,
    base: &TestRequest,
) -> Result<(), HarnessError> {
    session.clear_artifacts();
    for mode in ELFMAP_MODES {
        let request = variant(base, &[("HUGETLB_ELFMAP", mode), ("HUGETLB_SHARE", "1")]);
        let result = async {
            session.run(&request).await?;
            session.run(&request).await
        }
        .await;
        session.clear_artifacts();
        result?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_env_goes_first() {
        let base = TestRequest::named("linkhuge_nofd")
            .with_env(EnvOverlay::from_pairs(&[("HUGETLB_VERBOSE", "0")]));
        let request = variant(&base, &[("HUGETLB_MINIMAL_COPY", "no")]);
        assert_eq!(
            request.env.to_string(),
            "HUGETLB_MINIMAL_COPY=no HUGETLB_VERBOSE=0"
        );
        assert_eq!(request.command, base.command);
    }
}
