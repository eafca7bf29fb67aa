//! Harness configuration from defaults, an optional TOML file, and
//! `HUGETEST_*` environment variables.
//!
//! Layers apply in order: defaults, then the file, then the environment.
//! Command-line flags are applied last by the caller. Invalid environment
//! values are ignored and the lower layer's value is kept.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `HUGETEST_ROOT` | `.` | Directory holding `obj32/` and `obj64/` |
//! | `HUGETEST_MEMINFO` | `/proc/meminfo` | Memory information file |
//! | `HUGETEST_SHMMAX_PATH` | `/proc/sys/kernel/shmmax` | Segment size limit file |
//! | `HUGETEST_SHMALL_PATH` | `/proc/sys/kernel/shmall` | Total shared memory limit file |
//! | `HUGETEST_STRESS_ITERATIONS` | 10 | Loop count for looping stress tests |
//! | `HUGETEST_SHM_THREADS` | 10 | Thread count for shm-fork |
//! | `HUGETEST_LOG` | unset | Tracing filter override |
//! | `HUGETEST_LOG_FORMAT` | `pretty` | `pretty` or `json` |

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::HarnessError;
use crate::lifecycle::{SHMALL_PATH, SHMMAX_PATH};
use crate::session::SuiteSettings;
use crate::telemetry::LogFormat;

pub const ENV_ROOT: &str = "HUGETEST_ROOT";
pub const ENV_MEMINFO: &str = "HUGETEST_MEMINFO";
pub const ENV_SHMMAX_PATH: &str = "HUGETEST_SHMMAX_PATH";
pub const ENV_SHMALL_PATH: &str = "HUGETEST_SHMALL_PATH";
pub const ENV_STRESS_ITERATIONS: &str = "HUGETEST_STRESS_ITERATIONS";
pub const ENV_SHM_THREADS: &str = "HUGETEST_SHM_THREADS";
pub const ENV_LOG: &str = "HUGETEST_LOG";
pub const ENV_LOG_FORMAT: &str = "HUGETEST_LOG_FORMAT";

/// Fully resolved harness configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub root: PathBuf,
    pub meminfo_path: PathBuf,
    pub shmmax_path: PathBuf,
    pub shmall_path: PathBuf,
    pub stress_iterations: u32,
    pub shm_threads: u32,
    pub log_filter: Option<String>,
    pub log_format: LogFormat,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            meminfo_path: PathBuf::from("/proc/meminfo"),
            shmmax_path: PathBuf::from(SHMMAX_PATH),
            shmall_path: PathBuf::from(SHMALL_PATH),
            stress_iterations: 10,
            shm_threads: 10,
            log_filter: None,
            log_format: LogFormat::Pretty,
        }
    }
}

/// On-disk form of the configuration. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub root: Option<PathBuf>,
    pub meminfo: Option<PathBuf>,
    pub shmmax_path: Option<PathBuf>,
    pub shmall_path: Option<PathBuf>,
    pub stress_iterations: Option<u32>,
    pub shm_threads: Option<u32>,
    pub log: Option<String>,
    pub log_format: Option<String>,
}

impl FileConfig {
    /// Read and parse a TOML config file.
    pub fn read(path: &Path) -> Result<Self, HarnessError> {
        let text = std::fs::read_to_string(path).map_err(|source| HarnessError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|message| HarnessError::ConfigParse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }
}

/// Parse a `u32` env var, returning `current` on missing or invalid.
fn parse_u32(key: &str, current: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u32>().unwrap_or(current),
        Err(_) => current,
    }
}

/// Non-empty env var as a path.
fn parse_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

impl EnvConfig {
    /// Overlay the values present in `file`.
    pub fn apply_file(mut self, file: FileConfig) -> Result<Self, String> {
        if let Some(root) = file.root {
            self.root = root;
        }
        if let Some(path) = file.meminfo {
            self.meminfo_path = path;
        }
        if let Some(path) = file.shmmax_path {
            self.shmmax_path = path;
        }
        if let Some(path) = file.shmall_path {
            self.shmall_path = path;
        }
        if let Some(n) = file.stress_iterations {
            self.stress_iterations = n;
        }
        if let Some(n) = file.shm_threads {
            self.shm_threads = n;
        }
        if let Some(filter) = file.log {
            self.log_filter = Some(filter);
        }
        if let Some(format) = file.log_format {
            self.log_format = format.parse().map_err(|e| format!("{}", e))?;
        }
        Ok(self.clamped())
    }

    /// Overlay the `HUGETEST_*` environment variables that are set.
    pub fn apply_env(mut self) -> Self {
        if let Some(root) = parse_path(ENV_ROOT) {
            self.root = root;
        }
        if let Some(path) = parse_path(ENV_MEMINFO) {
            self.meminfo_path = path;
        }
        if let Some(path) = parse_path(ENV_SHMMAX_PATH) {
            self.shmmax_path = path;
        }
        if let Some(path) = parse_path(ENV_SHMALL_PATH) {
            self.shmall_path = path;
        }
        self.stress_iterations = parse_u32(ENV_STRESS_ITERATIONS, self.stress_iterations);
        self.shm_threads = parse_u32(ENV_SHM_THREADS, self.shm_threads);
        if let Ok(filter) = std::env::var(ENV_LOG) {
            if !filter.trim().is_empty() {
                self.log_filter = Some(filter);
            }
        }
        if let Some(format) = std::env::var(ENV_LOG_FORMAT)
            .ok()
            .and_then(|v| v.parse::<LogFormat>().ok())
        {
            self.log_format = format;
        }
        self.clamped()
    }

    fn clamped(mut self) -> Self {
        self.stress_iterations = self.stress_iterations.max(1);
        self.shm_threads = self.shm_threads.max(1);
        self
    }

    /// Limit files in the order they are snapshotted.
    pub fn limit_files(&self) -> Vec<PathBuf> {
        vec![self.shmmax_path.clone(), self.shmall_path.clone()]
    }

    /// Settings handed to the test catalogues.
    pub fn suite_settings(&self) -> SuiteSettings {
        SuiteSettings {
            meminfo_path: self.meminfo_path.clone(),
            stress_iterations: self.stress_iterations,
            shm_threads: self.shm_threads,
        }
    }

    /// Key/value summary of every effective value, in display order.
    pub fn effective_config(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_ROOT, self.root.display().to_string()),
            (ENV_MEMINFO, self.meminfo_path.display().to_string()),
            (ENV_SHMMAX_PATH, self.shmmax_path.display().to_string()),
            (ENV_SHMALL_PATH, self.shmall_path.display().to_string()),
            (ENV_STRESS_ITERATIONS, self.stress_iterations.to_string()),
            (ENV_SHM_THREADS, self.shm_threads.to_string()),
            (ENV_LOG, self.log_filter.clone().unwrap_or_default()),
            (ENV_LOG_FORMAT, log_format_name(self.log_format).to_string()),
        ]
    }
}

fn log_format_name(format: LogFormat) -> &'static str {
    match format {
        LogFormat::Json => "json",
        LogFormat::Pretty => "pretty",
    }
}

/// Defaults overlaid with the environment.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    EnvConfig::default().apply_env()
}

/// Defaults, then `file` if given, then the environment.
pub fn load_layered(file: Option<&Path>) -> Result<EnvConfig, HarnessError> {
    let mut config = EnvConfig::default();
    if let Some(path) = file {
        let parsed = FileConfig::read(path)?;
        config = config
            .apply_file(parsed)
            .map_err(|message| HarnessError::ConfigParse {
                path: path.to_path_buf(),
                message,
            })?;
    }
    Ok(config.apply_env())
}
