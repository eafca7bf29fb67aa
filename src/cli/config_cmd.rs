// Copyright 2024-2026 hugetest-matrix Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults.
//!
//! These commands only read configuration; nothing on the host is probed.

use std::path::Path;

use crate::config::{self, EnvConfig};

/// Print effective config as key-value pairs to stdout.
///
/// Returns 0 on success, 1 if the config file cannot be loaded.
pub fn run_show(config_file: Option<&Path>) -> i32 {
    match config::load_layered(config_file) {
        Ok(cfg) => {
            print!("{}", render_config(&cfg));
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Print default config values (no file, no env overrides) to stdout.
pub fn run_defaults() {
    print!("{}", render_config(&EnvConfig::default()));
}

fn render_config(cfg: &EnvConfig) -> String {
    cfg.effective_config()
        .into_iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_all_fields() {
        let text = render_config(&EnvConfig::default());
        assert!(text.contains("HUGETEST_ROOT=.\n"));
        assert!(text.contains("HUGETEST_SHMMAX_PATH=/proc/sys/kernel/shmmax\n"));
        assert!(text.contains("HUGETEST_STRESS_ITERATIONS=10\n"));
        assert!(text.contains("HUGETEST_LOG=\n"));
        assert!(text.contains("HUGETEST_LOG_FORMAT=pretty\n"));
        assert_eq!(text.lines().count(), 8);
    }

    #[test]
    fn test_show_fails_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run_show(Some(&dir.path().join("absent.toml"))), 1);
    }
}
