// Copyright 2024-2026 hugetest-matrix Contributors
// SPDX-License-Identifier: Apache-2.0

//! Command-line parsing for the test driver.
//!
//! ## Usage
//!
//! ```bash
//! hugetest-matrix                        # every test set, every word size
//! hugetest-matrix -t func -b 64          # functional tests, 64-bit only
//! hugetest-matrix -p "2097152 1073741824"
//! hugetest-matrix config show            # effective configuration
//! ```

pub mod config_cmd;

use std::path::PathBuf;

use thiserror::Error;

use crate::compose::Verbosity;
use crate::generators::{TestSet, UnknownTestSet};
use crate::matrix::{PageSize, WordSize};

/// Usage errors. All of them are fatal (exit status 1).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Unknown argument: {0}")]
    UnknownArgument(String),

    #[error("Missing value for {0}")]
    MissingValue(String),

    #[error(transparent)]
    UnknownTestSet(#[from] UnknownTestSet),

    #[error("Invalid word size: {0} (expected 32 or 64)")]
    InvalidWordSize(String),

    #[error("Invalid page size: {0} (expected a positive byte count)")]
    InvalidPageSize(String),

    #[error("Unknown config subcommand: {0}")]
    UnknownConfigSubcommand(String),
}

/// Options of a test run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// `-v`: show test output, library verbosity 2.
    pub verbose: bool,
    /// `-V`: library verbosity 99.
    pub very_verbose: bool,
    pub test_sets: Vec<TestSet>,
    pub word_sizes: Vec<WordSize>,
    pub page_sizes: Vec<PageSize>,
    pub config_file: Option<PathBuf>,
    pub json: bool,
}

impl RunOptions {
    pub fn verbosity(&self) -> Verbosity {
        let verbosity = if self.verbose {
            Verbosity::verbose()
        } else {
            Verbosity::default()
        };
        if self.very_verbose {
            verbosity.very_verbose()
        } else {
            verbosity
        }
    }

    /// Tracing filter matching the requested verbosity.
    pub fn log_level(&self) -> &'static str {
        if self.very_verbose {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }

    /// Selected test sets in execution order; all of them when none given.
    pub fn selected_test_sets(&self) -> Vec<TestSet> {
        if self.test_sets.is_empty() {
            return TestSet::ALL.to_vec();
        }
        TestSet::ALL
            .into_iter()
            .filter(|s| self.test_sets.contains(s))
            .collect()
    }

    /// Selected word sizes, ascending; both when none given.
    pub fn selected_word_sizes(&self) -> Vec<WordSize> {
        if self.word_sizes.is_empty() {
            return WordSize::ALL.to_vec();
        }
        WordSize::ALL
            .into_iter()
            .filter(|w| self.word_sizes.contains(w))
            .collect()
    }

    /// Explicit page sizes, or `None` to discover them on the host.
    pub fn requested_page_sizes(&self) -> Option<Vec<PageSize>> {
        if self.page_sizes.is_empty() {
            return None;
        }
        let mut pages = self.page_sizes.clone();
        pages.sort();
        pages.dedup();
        Some(pages)
    }
}

/// A parsed invocation of the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(RunOptions),
    ConfigShow { config_file: Option<PathBuf> },
    ConfigDefaults,
    Help(Option<String>),
    Version,
}

/// Parse the arguments that follow the program name.
pub fn parse_args(args: &[String]) -> Result<Command, CliError> {
    let Some(first) = args.first() else {
        return Ok(Command::Run(RunOptions::default()));
    };
    match first.as_str() {
        "run" => parse_run(&args[1..]).map(Command::Run),
        "config" => parse_config(&args[1..]),
        "help" | "--help" | "-h" => Ok(Command::Help(args.get(1).cloned())),
        "version" | "--version" => Ok(Command::Version),
        flag if flag.starts_with('-') => parse_run(args).map(Command::Run),
        other => Err(CliError::UnknownCommand(other.to_string())),
    }
}

fn parse_run(args: &[String]) -> Result<RunOptions, CliError> {
    let mut opts = RunOptions::default();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "-v" | "--verbose" => opts.verbose = true,
            "-V" | "--very-verbose" => opts.very_verbose = true,
            "--json" => opts.json = true,
            "--config" => {
                let value = take_value(args, &mut i, arg)?;
                opts.config_file = Some(PathBuf::from(value));
            }
            _ => {
                let (flag, value) = match short_with_value(arg) {
                    Some((flag, Some(attached))) => (flag, attached.to_string()),
                    Some((flag, None)) => (flag, take_value(args, &mut i, arg)?),
                    None => return Err(CliError::UnknownArgument(arg.to_string())),
                };
                apply_list(&mut opts, flag, &value)?;
            }
        }
        i += 1;
    }
    Ok(opts)
}

fn parse_config(args: &[String]) -> Result<Command, CliError> {
    let sub = args.first().map(String::as_str).unwrap_or("show");
    match sub {
        "show" => {
            let mut config_file = None;
            let mut i = 1;
            while i < args.len() {
                match args[i].as_str() {
                    "--config" => {
                        let value = take_value(args, &mut i, "--config")?;
                        config_file = Some(PathBuf::from(value));
                    }
                    other => return Err(CliError::UnknownArgument(other.to_string())),
                }
                i += 1;
            }
            Ok(Command::ConfigShow { config_file })
        }
        "defaults" => match args.get(1) {
            Some(extra) => Err(CliError::UnknownArgument(extra.clone())),
            None => Ok(Command::ConfigDefaults),
        },
        other => Err(CliError::UnknownConfigSubcommand(other.to_string())),
    }
}

/// Split `-t`, `-b`, `-p` and their getopt-style attached forms (`-tfunc`).
fn short_with_value(arg: &str) -> Option<(char, Option<&str>)> {
    let rest = arg.strip_prefix('-')?;
    let mut chars = rest.chars();
    let flag = chars.next().filter(|c| matches!(c, 't' | 'b' | 'p'))?;
    let attached = chars.as_str();
    Some((flag, (!attached.is_empty()).then_some(attached)))
}

fn take_value(args: &[String], i: &mut usize, flag: &str) -> Result<String, CliError> {
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| CliError::MissingValue(flag.to_string()))
}

/// Items of a whitespace- or comma-separated list.
fn list_items(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
}

fn apply_list(opts: &mut RunOptions, flag: char, value: &str) -> Result<(), CliError> {
    for item in list_items(value) {
        match flag {
            't' => opts.test_sets.push(item.parse()?),
            'b' => {
                let word = item
                    .parse::<u32>()
                    .ok()
                    .and_then(WordSize::from_bits)
                    .ok_or_else(|| CliError::InvalidWordSize(item.to_string()))?;
                opts.word_sizes.push(word);
            }
            _ => {
                let page = item
                    .parse::<u64>()
                    .ok()
                    .and_then(PageSize::new)
                    .ok_or_else(|| CliError::InvalidPageSize(item.to_string()))?;
                opts.page_sizes.push(page);
            }
        }
    }
    Ok(())
}

/// Top-level usage text.
pub fn usage() -> String {
    format!(
        "hugetest-matrix v{}
Run the huge page test suite across page sizes and word sizes.

USAGE:
    hugetest-matrix [run] [OPTIONS]
    hugetest-matrix config [show|defaults]
    hugetest-matrix help [COMMAND]
    hugetest-matrix version

OPTIONS:
    -v               Show test output, library verbosity 2
    -V               Library verbosity 99, debug diagnostics
    -t SETS          Test sets to run: func, stress (default: both)
    -b SIZES         Word sizes to test: 32, 64 (default: both)
    -p SIZES         Page sizes in bytes (default: discovered on the host)
    --config FILE    Load configuration from a TOML file
    --json           Print the summary as JSON

    Lists may be separated by spaces or commas: -b \"32 64\", -b 32,64.

ENVIRONMENT:
    HUGETEST_ROOT               Directory holding obj32/ and obj64/ (default: .)
    HUGETEST_MEMINFO            Memory information file (default: /proc/meminfo)
    HUGETEST_SHMMAX_PATH        Segment size limit file
    HUGETEST_SHMALL_PATH        Total shared memory limit file
    HUGETEST_STRESS_ITERATIONS  Loop count for looping stress tests (default: 10)
    HUGETEST_SHM_THREADS        Thread count for shm-fork (default: 10)
    HUGETEST_LOG                Diagnostic filter (e.g. hugetest_matrix=debug)
    HUGETEST_LOG_FORMAT         pretty or json

EXIT CODES:
    0    Run completed (test failures are reported in the summary)
    1    Usage or configuration error
    130  Interrupted
",
        env!("CARGO_PKG_VERSION")
    )
}

/// Detailed help for one command.
pub fn command_help(command: &str) -> Option<&'static str> {
    match command {
        "run" => Some(
            "hugetest-matrix run - Run the test suite

USAGE:
    hugetest-matrix run [-v|-V] [-t SETS] [-b SIZES] [-p SIZES] [--config FILE] [--json]

DESCRIPTION:
    Probes the host for usable page sizes and mounts, runs every selected
    test for each valid page size and word size, and prints a summary.
    Tests whose binaries were not built for a word size are not counted.
",
        ),
        "config" => Some(
            "hugetest-matrix config - Show configuration

USAGE:
    hugetest-matrix config show [--config FILE]
    hugetest-matrix config defaults

SUBCOMMANDS:
    show           Effective configuration (defaults, file, environment)
    defaults       Built-in defaults
",
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn run_opts(list: &[&str]) -> RunOptions {
        match parse_args(&args(list)).unwrap() {
            Command::Run(opts) => opts,
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_no_args_runs_everything() {
        let opts = run_opts(&[]);
        assert_eq!(opts.selected_test_sets(), TestSet::ALL.to_vec());
        assert_eq!(opts.selected_word_sizes(), WordSize::ALL.to_vec());
        assert_eq!(opts.requested_page_sizes(), None);
        assert_eq!(opts.verbosity(), Verbosity::default());
        assert_eq!(opts.log_level(), "warn");
    }

    #[test]
    fn test_lists_accept_spaces_and_commas() {
        let opts = run_opts(&["-t", "stress func", "-b", "64,32", "-p", "2097152"]);
        assert_eq!(opts.selected_test_sets(), vec![TestSet::Functional, TestSet::Stress]);
        assert_eq!(opts.selected_word_sizes(), vec![WordSize::W32, WordSize::W64]);
        assert_eq!(
            opts.requested_page_sizes(),
            Some(vec![PageSize::new(2097152).unwrap()])
        );
    }

    #[test]
    fn test_attached_short_values() {
        let opts = run_opts(&["run", "-tfunc", "-b64"]);
        assert_eq!(opts.test_sets, vec![TestSet::Functional]);
        assert_eq!(opts.word_sizes, vec![WordSize::W64]);
    }

    #[test]
    fn test_verbosity_flags() {
        let opts = run_opts(&["-v"]);
        assert_eq!(opts.verbosity(), Verbosity::verbose());
        assert_eq!(opts.log_level(), "info");

        let opts = run_opts(&["-V"]);
        assert_eq!(opts.verbosity().library_level, 99);
        assert!(!opts.verbosity().show_test_output);
        assert_eq!(opts.log_level(), "debug");
    }

    #[test]
    fn test_usage_errors() {
        assert_eq!(
            parse_args(&args(&["-b", "16"])),
            Err(CliError::InvalidWordSize("16".to_string()))
        );
        assert_eq!(
            parse_args(&args(&["-p", "0"])),
            Err(CliError::InvalidPageSize("0".to_string()))
        );
        assert_eq!(
            parse_args(&args(&["-t", "perf"])),
            Err(CliError::UnknownTestSet(UnknownTestSet("perf".to_string())))
        );
        assert_eq!(
            parse_args(&args(&["-b"])),
            Err(CliError::MissingValue("-b".to_string()))
        );
        assert_eq!(
            parse_args(&args(&["-x"])),
            Err(CliError::UnknownArgument("-x".to_string()))
        );
        assert_eq!(
            parse_args(&args(&["serve"])),
            Err(CliError::UnknownCommand("serve".to_string()))
        );
    }

    #[test]
    fn test_config_subcommands() {
        assert_eq!(
            parse_args(&args(&["config"])),
            Ok(Command::ConfigShow { config_file: None })
        );
        assert_eq!(
            parse_args(&args(&["config", "show", "--config", "h.toml"])),
            Ok(Command::ConfigShow {
                config_file: Some(PathBuf::from("h.toml"))
            })
        );
        assert_eq!(
            parse_args(&args(&["config", "defaults"])),
            Ok(Command::ConfigDefaults)
        );
        assert!(matches!(
            parse_args(&args(&["config", "validate"])),
            Err(CliError::UnknownConfigSubcommand(_))
        ));
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse_args(&args(&["help"])), Ok(Command::Help(None)));
        assert_eq!(
            parse_args(&args(&["help", "run"])),
            Ok(Command::Help(Some("run".to_string())))
        );
        assert_eq!(parse_args(&args(&["--version"])), Ok(Command::Version));
        assert!(usage().contains("-t SETS"));
        assert!(command_help("config").is_some());
        assert!(command_help("serve").is_none());
    }
}
