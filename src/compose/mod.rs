//! Environment and command composition for test invocations.
//!
//! Composition is pure: overlays are ordered lists of environment operations
//! that are resolved against an inherited environment only when a process is
//! actually spawned. Nothing here touches the host.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::matrix::{PageSize, WordSize};

/// Join two fragments with exactly one space, dropping empty sides.
pub fn combine(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{} {}", a, b),
    }
}

/// One operation on an environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvOp {
    /// Set unconditionally.
    Set(String),
    /// Remove from the child environment.
    Unset,
    /// Set only if the variable is absent or empty.
    Default(String),
    /// Append colon-separated entries to the current value.
    AppendPath(Vec<String>),
}

/// An ordered set of environment operations. Later entries win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverlay {
    ops: Vec<(String, EnvOp)>,
}

impl EnvOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay made of plain assignments.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        pairs
            .iter()
            .fold(Self::new(), |overlay, (k, v)| overlay.set(k, v))
    }

    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.ops.push((key.to_string(), EnvOp::Set(value.to_string())));
        self
    }

    pub fn unset(mut self, key: &str) -> Self {
        self.ops.push((key.to_string(), EnvOp::Unset));
        self
    }

    pub fn default_value(mut self, key: &str, value: &str) -> Self {
        self.ops.push((key.to_string(), EnvOp::Default(value.to_string())));
        self
    }

    pub fn append_path(mut self, key: &str, entries: &[String]) -> Self {
        self.ops.push((key.to_string(), EnvOp::AppendPath(entries.to_vec())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Concatenate two overlays; `other` is applied after `self`.
    pub fn combine(&self, other: &EnvOverlay) -> EnvOverlay {
        let mut ops = self.ops.clone();
        ops.extend(other.ops.iter().cloned());
        EnvOverlay { ops }
    }

    /// Last plain assignment for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.ops.iter().rev().find_map(|(k, op)| match op {
            EnvOp::Set(v) if k == key => Some(v.as_str()),
            _ => None,
        })
    }

    /// Resolve against an inherited environment.
    ///
    /// Returns the final value per touched key; `None` means the key must be
    /// removed from the child environment.
    pub fn resolve<F>(&self, inherited: F) -> BTreeMap<String, Option<String>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut resolved: BTreeMap<String, Option<String>> = BTreeMap::new();
        for (key, op) in &self.ops {
            let current = match resolved.get(key) {
                Some(v) => v.clone(),
                None => inherited(key),
            };
            let next = match op {
                EnvOp::Set(v) => Some(v.clone()),
                EnvOp::Unset => None,
                EnvOp::Default(v) => match current {
                    Some(c) if !c.is_empty() => Some(c),
                    _ => Some(v.clone()),
                },
                EnvOp::AppendPath(entries) => {
                    let mut parts: Vec<String> = current
                        .into_iter()
                        .filter(|c| !c.is_empty())
                        .collect();
                    parts.extend(entries.iter().cloned());
                    Some(parts.join(":"))
                }
            };
            resolved.insert(key.clone(), next);
        }
        resolved
    }
}

impl fmt::Display for EnvOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.ops.iter().fold(String::new(), |acc, (key, op)| {
            let fragment = match op {
                EnvOp::Set(v) => format!("{}={}", key, quote(v)),
                EnvOp::Unset => format!("-u {}", key),
                EnvOp::Default(v) => format!("{}=${{{}:-{}}}", key, key, quote(v)),
                EnvOp::AppendPath(entries) => format!("{}=${}:{}", key, key, entries.join(":")),
            };
            combine(&acc, &fragment)
        });
        f.write_str(&text)
    }
}

fn quote(value: &str) -> String {
    if value.is_empty() || value.contains(char::is_whitespace) {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

/// A test program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl TestCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    /// Split a catalogue entry such as `"alloc-instantiate-race shared"`.
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let program = words.next().unwrap_or_default().to_string();
        Self {
            program,
            args: words.map(str::to_string).collect(),
        }
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Same command with a prefixed program name (`xB.linkhuge`).
    pub fn prefixed(&self, prefix: &str) -> Self {
        Self {
            program: format!("{}{}", prefix, self.program),
            args: self.args.clone(),
        }
    }
}

impl fmt::Display for TestCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .args
            .iter()
            .fold(self.program.clone(), |acc, a| combine(&acc, a));
        f.write_str(&text)
    }
}

/// Fully composed description of one process to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: EnvOverlay,
    pub current_dir: PathBuf,
}

/// How much the tested library and test programs should talk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verbosity {
    /// Let test programs print their own progress (drops `QUIET_TEST`).
    pub show_test_output: bool,
    /// Default for `HUGETLB_VERBOSE` when the caller has not set it.
    pub library_level: u8,
}

impl Verbosity {
    /// `-v`: test output on, library verbosity 2.
    pub fn verbose() -> Self {
        Self {
            show_test_output: true,
            library_level: 2,
        }
    }

    /// `-V`: library verbosity 99.
    pub fn very_verbose(self) -> Self {
        Self {
            library_level: 99,
            ..self
        }
    }
}

/// Builds invocation environments from a base overlay plus per-run parts.
#[derive(Debug, Clone)]
pub struct EnvironmentComposer {
    base: EnvOverlay,
    work_dir: PathBuf,
}

impl EnvironmentComposer {
    pub fn new(verbosity: Verbosity, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            base: base_overlay(verbosity),
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Directory holding binaries built for `word`.
    pub fn obj_dir(&self, word: WordSize) -> PathBuf {
        self.work_dir.join(word.obj_dir())
    }

    /// Compose the full invocation for `command`.
    ///
    /// Order: base overlay, word/page overlay, then `extra`, so `extra` may
    /// override anything the harness sets.
    pub fn compose(
        &self,
        word: Option<WordSize>,
        page: Option<PageSize>,
        extra: &EnvOverlay,
        command: &TestCommand,
    ) -> Invocation {
        let env = self
            .base
            .combine(&word_overlay(word, page))
            .combine(extra);
        Invocation {
            program: command.program.clone(),
            args: command.args.clone(),
            env,
            current_dir: self.work_dir.clone(),
        }
    }
}

/// Harness-wide settings applied to every child process.
pub fn base_overlay(verbosity: Verbosity) -> EnvOverlay {
    let overlay = if verbosity.show_test_output {
        EnvOverlay::new().unset("QUIET_TEST")
    } else {
        EnvOverlay::new().set("QUIET_TEST", "1")
    };
    overlay
        .set("HUGETLBFS_MOUNTS", "")
        .unset("HUGETLB_ELFMAP")
        .unset("HUGETLB_MORECORE")
        .default_value("HUGETLB_VERBOSE", &verbosity.library_level.to_string())
}

/// Search paths for a word size's build output and the page size default.
///
/// With no word size the paths point at the unsuffixed `obj` directories,
/// which is where the host utilities live.
pub fn word_overlay(word: Option<WordSize>, page: Option<PageSize>) -> EnvOverlay {
    let suffix = word.map(|w| w.bits().to_string()).unwrap_or_default();
    let overlay = EnvOverlay::new()
        .append_path(
            "PATH",
            &[format!("./obj{}", suffix), format!("../obj{}", suffix)],
        )
        .append_path(
            "LD_LIBRARY_PATH",
            &[format!("../obj{}", suffix), format!("obj{}", suffix)],
        );
    match page {
        Some(p) => overlay.set("HUGETLB_DEFAULT_PAGE_SIZE", &p.bytes().to_string()),
        None => overlay,
    }
}
