//! Host discovery through scripted helper programs.

mod common;

use std::path::{Path, PathBuf};

use common::{page, word_of, ScriptedRunner};
use hugetest_matrix::compose::{EnvironmentComposer, Invocation, Verbosity};
use hugetest_matrix::invoker::{CommandRunner, Completion};
use hugetest_matrix::matrix::WordSize;
use hugetest_matrix::resolver::Resolver;

/// Host with 2M pages for both word sizes and 1G pages for 64-bit only.
fn host(inv: &Invocation) -> Completion {
    match inv.program.as_str() {
        "hugeadm" => Completion::exited(0, "2097152\n1073741824\n"),
        "get_hugetlbfs_path" => {
            let size = inv.env.get("HUGETLB_DEFAULT_PAGE_SIZE").unwrap_or_default();
            match (size, word_of(inv)) {
                ("2097152", Some(_)) => Completion::exited(0, "/mnt/huge\n"),
                ("1073741824", Some(WordSize::W64)) => Completion::exited(0, "/mnt/huge-1G\n"),
                _ => Completion::exited(1, "Unable to find mount"),
            }
        }
        "gcc" if inv.args.first().map(String::as_str) == Some("-m32") => {
            Completion::exited(0, "SECTIONS { .text : { *(.text) } } /* SPECIAL */")
        }
        "gcc" => Completion::exited(0, "SECTIONS { .text : { *(.text) } }"),
        other => panic!("unexpected program {}", other),
    }
}

fn resolver(runner: std::sync::Arc<ScriptedRunner>) -> Resolver {
    let runner: std::sync::Arc<dyn CommandRunner> = runner;
    Resolver::new(runner, EnvironmentComposer::new(Verbosity::default(), "/tests"))
}

#[tokio::test]
async fn discovery_builds_validity_and_mounts() {
    let runner = ScriptedRunner::new(host);
    let resolution = resolver(runner.clone())
        .resolve(&WordSize::ALL, None)
        .await;

    let validity = &resolution.validity;
    assert_eq!(validity.page_sizes(), vec![page(2097152), page(1073741824)]);
    assert!(validity.is_valid(page(2097152), WordSize::W32));
    assert!(validity.is_valid(page(2097152), WordSize::W64));
    assert!(!validity.is_valid(page(1073741824), WordSize::W32));
    assert!(validity.is_valid(page(1073741824), WordSize::W64));

    let mounts: Vec<&Path> = resolution.mounts.iter().collect();
    assert_eq!(mounts, vec![Path::new("/mnt/huge"), Path::new("/mnt/huge-1G")]);

    assert_eq!(
        runner.command_lines(),
        vec![
            "hugeadm --page-sizes",
            "get_hugetlbfs_path",
            "get_hugetlbfs_path",
            "get_hugetlbfs_path",
            "get_hugetlbfs_path",
        ]
    );
    for call in runner.calls() {
        assert_eq!(call.current_dir, PathBuf::from("/tests"));
    }
}

#[tokio::test]
async fn page_size_tool_failure_yields_empty_table() {
    let runner = ScriptedRunner::new(|_| Completion::exited(1, "hugeadm: not found"));
    let resolution = resolver(runner.clone())
        .resolve(&WordSize::ALL, None)
        .await;

    assert!(resolution.page_sizes().is_empty());
    assert!(resolution.mounts.is_empty());
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn requested_page_without_mount_keeps_empty_entry() {
    let runner = ScriptedRunner::new(host);
    let requested = [page(16384), page(2097152)];
    let resolution = resolver(runner.clone())
        .resolve(&[WordSize::W64], Some(&requested))
        .await;

    let words = resolution.validity.words_for(page(16384));
    assert_eq!(words.map(|w| w.len()), Some(0));
    assert!(resolution.validity.is_valid(page(2097152), WordSize::W64));
    // No discovery when page sizes were given.
    assert!(runner.calls().iter().all(|c| c.program != "hugeadm"));
    assert_eq!(runner.calls().len(), 2);
}

#[tokio::test]
async fn linker_marker_excludes_word_size() {
    let runner = ScriptedRunner::new(host);
    let link = resolver(runner.clone())
        .probe_link_compatibility(&WordSize::ALL)
        .await;

    assert!(!link.contains(WordSize::W32));
    assert!(link.contains(WordSize::W64));
    assert_eq!(
        runner.command_lines(),
        vec!["gcc -m32 -Wl,--verbose", "gcc -m64 -Wl,--verbose"]
    );
}

#[tokio::test]
async fn unqueryable_linker_is_assumed_compatible() {
    let runner = ScriptedRunner::new(|_| Completion::exited(127, ""));
    let link = resolver(runner)
        .probe_link_compatibility(&WordSize::ALL)
        .await;

    assert_eq!(link.iter().collect::<Vec<_>>(), WordSize::ALL.to_vec());
}

#[tokio::test]
async fn blank_or_relative_mount_path_is_rejected() {
    let runner = ScriptedRunner::new(|inv: &Invocation| match word_of(inv) {
        Some(WordSize::W32) => Completion::exited(0, "\n"),
        _ => Completion::exited(0, "relative/huge\n"),
    });
    let requested = [page(2097152)];
    let resolution = resolver(runner.clone())
        .resolve(&WordSize::ALL, Some(&requested))
        .await;

    assert!(resolution.mounts.is_empty());
    assert_eq!(
        resolution.validity.words_for(page(2097152)).map(|w| w.len()),
        Some(0)
    );
    assert_eq!(runner.calls().len(), 2);
}
