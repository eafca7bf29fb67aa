//! Huge page counters from the memory-information pseudo-file.

use std::path::Path;

/// Huge page pool figures for the default huge page size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub hugepages_total: u64,
    pub hugepages_free: u64,
    /// Default huge page size in bytes.
    pub hugepage_size: u64,
}

impl MemInfo {
    /// Read and parse a meminfo file.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Parse meminfo text. Missing or malformed keys read as zero.
    pub fn parse(text: &str) -> Self {
        let mut info = Self::default();
        for line in text.lines() {
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let value = rest
                .split_whitespace()
                .next()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            match key.trim() {
                "HugePages_Total" => info.hugepages_total = value,
                "HugePages_Free" => info.hugepages_free = value,
                // Reported in kB.
                "Hugepagesize" => info.hugepage_size = value.saturating_mul(1024),
                _ => {}
            }
        }
        info
    }

    /// Bytes covered by the whole pool.
    pub fn pool_bytes(&self) -> u64 {
        self.hugepages_total.saturating_mul(self.hugepage_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "MemTotal:       16318712 kB
MemFree:         9140012 kB
HugePages_Total:      64
HugePages_Free:       60
HugePages_Rsvd:        0
HugePages_Surp:        0
Hugepagesize:       2048 kB
Hugetlb:          131072 kB
";

    #[test]
    fn test_parse_sample() {
        let info = MemInfo::parse(SAMPLE);
        assert_eq!(info.hugepages_total, 64);
        assert_eq!(info.hugepages_free, 60);
        assert_eq!(info.hugepage_size, 2 * 1024 * 1024);
        assert_eq!(info.pool_bytes(), 64 * 2 * 1024 * 1024);
    }

    #[test]
    fn test_parse_without_huge_pages() {
        let info = MemInfo::parse("MemTotal: 1024 kB\n");
        assert_eq!(info, MemInfo::default());
    }

    #[test]
    fn test_parse_garbage_value() {
        let info = MemInfo::parse("HugePages_Free: lots\nHugepagesize:\n");
        assert_eq!(info.hugepages_free, 0);
        assert_eq!(info.hugepage_size, 0);
    }

    #[test]
    fn test_read_missing_file() {
        assert!(MemInfo::read(Path::new("/nonexistent/meminfo")).is_err());
    }
}
