//! Identity of the harness process.

use std::path::Path;

/// Real-or-synthetic process identity used for privilege checks and for
/// naming per-user sharing directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostIdentity {
    pub uid: u32,
}

impl HostIdentity {
    /// Identity of the running process, if it can be determined.
    pub fn detect() -> Option<Self> {
        match current_uid() {
            Ok(uid) => Some(Self { uid }),
            Err(e) => {
                tracing::warn!("could not determine user id: {}", e);
                None
            }
        }
    }

    /// Whether this identity may rewrite host-wide limits.
    pub fn is_privileged(&self) -> bool {
        self.uid == 0
    }
}

/// User id owning this process, taken from `/proc/self`.
#[cfg(unix)]
pub fn current_uid() -> std::io::Result<u32> {
    use std::os::unix::fs::MetadataExt;

    Ok(std::fs::metadata(Path::new("/proc/self"))?.uid())
}

#[cfg(not(unix))]
pub fn current_uid() -> std::io::Result<u32> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("{} not available", Path::new("/proc/self").display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_privileged() {
        assert!(HostIdentity { uid: 0 }.is_privileged());
        assert!(!HostIdentity { uid: 1000 }.is_privileged());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_detect_on_linux() {
        assert!(HostIdentity::detect().is_some());
    }
}
