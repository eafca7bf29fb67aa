//! Limit restoration and artifact cleanup against temporary files.

use std::path::{Path, PathBuf};

use hugetest_matrix::lifecycle::{ArtifactCleaner, CleanupStats, LimitManager};
use hugetest_matrix::resolver::MountRegistry;

fn limit_files(dir: &Path) -> Vec<PathBuf> {
    let shmmax = dir.join("shmmax");
    let shmall = dir.join("shmall");
    std::fs::write(&shmmax, "18446744073692774399\n").unwrap();
    std::fs::write(&shmall, "18446744073692774399\n").unwrap();
    vec![shmmax, shmall]
}

fn contents(files: &[PathBuf]) -> Vec<Vec<u8>> {
    files.iter().map(|f| std::fs::read(f).unwrap()).collect()
}

#[test]
fn explicit_restore_leaves_files_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let files = limit_files(dir.path());
    let before = contents(&files);
    let manager = LimitManager::new(files.clone(), true);

    let guard = manager.acquire(2 * 1024 * 1024 * 1024).unwrap();
    assert_eq!(std::fs::read_to_string(&files[0]).unwrap(), "2147483648");
    assert_eq!(std::fs::read_to_string(&files[1]).unwrap(), "2147483648");
    assert_eq!(guard.snapshot().entries().len(), 2);

    guard.restore().unwrap();
    assert_eq!(contents(&files), before);
    assert!(!manager.is_held());
}

#[test]
fn dropped_guard_restores_limits() {
    let dir = tempfile::tempdir().unwrap();
    let files = limit_files(dir.path());
    let before = contents(&files);
    let manager = LimitManager::new(files.clone(), true);

    {
        let _guard = manager.acquire(1 << 20).unwrap();
        assert_ne!(contents(&files), before);
        assert!(manager.is_held());
    }

    assert_eq!(contents(&files), before);
    assert!(!manager.is_held());
}

#[test]
fn clones_share_one_hold() {
    let dir = tempfile::tempdir().unwrap();
    let manager = LimitManager::new(limit_files(dir.path()), true);
    let other = manager.clone();

    let guard = manager.acquire(4096).unwrap();
    assert!(other.acquire(4096).is_err());
    guard.restore().unwrap();
    assert!(other.acquire(4096).is_ok());
}

fn populate(share: &Path) {
    std::fs::create_dir_all(share.join("nested")).unwrap();
    std::fs::write(share.join("linkshare_32"), b"seg").unwrap();
    std::fs::write(share.join("linkshare_64"), b"seg").unwrap();
    std::fs::write(share.join("nested/extra"), b"seg").unwrap();
}

#[test]
fn cleanup_empties_every_mount_and_is_idempotent() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let mounts: MountRegistry = [first.path(), second.path()]
        .into_iter()
        .map(Path::to_path_buf)
        .collect();
    let cleaner = ArtifactCleaner::new(mounts, Some(500));

    for mount in [first.path(), second.path()] {
        populate(&mount.join("elflink-uid-500"));
    }
    // Another user's directory is not ours to remove.
    std::fs::create_dir(first.path().join("elflink-uid-501")).unwrap();

    let stats = cleaner.clear();
    assert_eq!(
        stats,
        CleanupStats {
            files_removed: 6,
            dirs_removed: 4,
        }
    );
    assert!(!first.path().join("elflink-uid-500").exists());
    assert!(!second.path().join("elflink-uid-500").exists());
    assert!(first.path().join("elflink-uid-501").is_dir());

    assert_eq!(cleaner.clear(), CleanupStats::default());
}

#[test]
fn cleanup_without_identity_touches_nothing() {
    let mount = tempfile::tempdir().unwrap();
    populate(&mount.path().join("elflink-uid-0"));
    let mounts: MountRegistry = std::iter::once(mount.path().to_path_buf()).collect();

    let stats = ArtifactCleaner::new(mounts, None).clear();

    assert_eq!(stats, CleanupStats::default());
    assert!(mount.path().join("elflink-uid-0/linkshare_32").exists());
}
