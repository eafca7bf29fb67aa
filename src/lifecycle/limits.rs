//! Host-wide shared memory limit adjustment.
//!
//! Tracks the two kernel limit files as a single critical resource: at most
//! one snapshot may be held at a time, and it is restored when the guard is
//! released or dropped.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Default location of the maximum segment size limit.
pub const SHMMAX_PATH: &str = "/proc/sys/kernel/shmmax";
/// Default location of the total shared memory limit.
pub const SHMALL_PATH: &str = "/proc/sys/kernel/shmall";

/// Errors from reading or writing limit files.
#[derive(Debug, Error)]
pub enum LimitError {
    #[error("Limits already held by another sequence")]
    AlreadyHeld,

    #[error("Failed to read limit {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write limit {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Original text of each limit file, in acquisition order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SysctlSnapshot {
    entries: Vec<(PathBuf, String)>,
}

impl SysctlSnapshot {
    /// True when nothing was captured (unprivileged run).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(PathBuf, String)] {
        &self.entries
    }

    /// Write every captured value back verbatim.
    ///
    /// Keeps going after a failure and reports the first one.
    pub fn restore(&self) -> Result<(), LimitError> {
        let mut first_err = None;
        for (path, original) in &self.entries {
            if let Err(e) = write_limit(path, original) {
                tracing::warn!("{}", e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Acquire/restore discipline over the limit files.
#[derive(Clone)]
pub struct LimitManager {
    files: Arc<Vec<PathBuf>>,
    privileged: bool,
    held: Arc<AtomicBool>,
}

impl LimitManager {
    pub fn new(files: Vec<PathBuf>, privileged: bool) -> Self {
        Self {
            files: Arc::new(files),
            privileged,
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// Snapshot every limit file and overwrite it with `target` bytes.
    ///
    /// Without privilege this returns a guard over an empty snapshot and
    /// touches nothing. If any write fails, the files already changed are
    /// restored before the error is returned.
    pub fn acquire(&self, target: u64) -> Result<LimitGuard, LimitError> {
        if self
            .held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LimitError::AlreadyHeld);
        }
        let mut guard = LimitGuard {
            snapshot: SysctlSnapshot::default(),
            held: self.held.clone(),
            restored: false,
        };
        if !self.privileged {
            tracing::debug!("not privileged, leaving shared memory limits alone");
            return Ok(guard);
        }

        for path in self.files.iter() {
            let original = std::fs::read_to_string(path).map_err(|source| LimitError::Read {
                path: path.clone(),
                source,
            })?;
            guard.snapshot.entries.push((path.clone(), original));
            write_limit(path, &target.to_string())?;
        }
        tracing::info!(limit = target, "set shmmax limit to {}", target);
        Ok(guard)
    }
}

/// RAII guard that restores the snapshot when dropped.
pub struct LimitGuard {
    snapshot: SysctlSnapshot,
    held: Arc<AtomicBool>,
    restored: bool,
}

impl LimitGuard {
    pub fn snapshot(&self) -> &SysctlSnapshot {
        &self.snapshot
    }

    /// Restore the snapshot now and release the resource.
    pub fn restore(mut self) -> Result<(), LimitError> {
        self.restored = true;
        self.snapshot.restore()
    }
}

impl Drop for LimitGuard {
    fn drop(&mut self) {
        if !self.restored {
            // Errors were already logged by restore.
            let _ = self.snapshot.restore();
        }
        self.held.store(false, Ordering::SeqCst);
    }
}

fn write_limit(path: &Path, value: &str) -> Result<(), LimitError> {
    std::fs::write(path, value).map_err(|source| LimitError::Write {
        path: path.to_path_buf(),
        source,
    })
}
