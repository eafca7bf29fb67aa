//! Shared host state touched by stateful test sequences: kernel shared
//! memory limits and on-disk sharing artifacts.

mod artifacts;
mod limits;

pub use artifacts::{ArtifactCleaner, CleanupStats, SHARE_DIR_PREFIX};
pub use limits::{LimitError, LimitGuard, LimitManager, SysctlSnapshot, SHMALL_PATH, SHMMAX_PATH};
