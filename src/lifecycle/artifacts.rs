//! Removal of segment-sharing artifacts left on huge page mounts.

use std::io;
use std::path::{Path, PathBuf};

use crate::resolver::MountRegistry;

/// Prefix of the per-user sharing directory created under each mount.
pub const SHARE_DIR_PREFIX: &str = "elflink-uid-";

/// What a cleanup pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub files_removed: u64,
    pub dirs_removed: u64,
}

impl CleanupStats {
    fn add(&mut self, other: CleanupStats) {
        self.files_removed += other.files_removed;
        self.dirs_removed += other.dirs_removed;
    }
}

/// Clears the per-user sharing directory on every registered mount.
#[derive(Debug, Clone)]
pub struct ArtifactCleaner {
    mounts: MountRegistry,
    uid: Option<u32>,
}

impl ArtifactCleaner {
    /// `uid` of `None` means the identity is unknown and nothing is cleared.
    pub fn new(mounts: MountRegistry, uid: Option<u32>) -> Self {
        Self { mounts, uid }
    }

    pub fn mounts(&self) -> &MountRegistry {
        &self.mounts
    }

    pub fn share_dir(&self, mount: &Path) -> Option<PathBuf> {
        self.uid
            .map(|uid| mount.join(format!("{}{}", SHARE_DIR_PREFIX, uid)))
    }

    /// Remove everything under each sharing directory, then the directory.
    ///
    /// A missing directory is not an error. Other failures are logged and
    /// the pass continues with the next mount.
    pub fn clear(&self) -> CleanupStats {
        let mut stats = CleanupStats::default();
        for mount in self.mounts.iter() {
            let Some(dir) = self.share_dir(mount) else {
                continue;
            };
            match remove_tree(&dir) {
                Ok(removed) => stats.add(removed),
                Err(e) => tracing::warn!(dir = %dir.display(), "cleanup failed: {}", e),
            }
        }
        if stats != CleanupStats::default() {
            tracing::debug!(
                files = stats.files_removed,
                dirs = stats.dirs_removed,
                "cleared sharing artifacts"
            );
        }
        stats
    }
}

/// Bottom-up removal of `dir` and its contents. Symlinks are removed, not
/// followed.
fn remove_tree(dir: &Path) -> io::Result<CleanupStats> {
    let mut stats = CleanupStats::default();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(stats),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let path = entry?.path();
        if std::fs::symlink_metadata(&path)?.is_dir() {
            stats.add(remove_tree(&path)?);
        } else {
            std::fs::remove_file(&path)?;
            stats.files_removed += 1;
        }
    }
    match std::fs::remove_dir(dir) {
        Ok(()) => stats.dirs_removed += 1,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    Ok(stats)
}
