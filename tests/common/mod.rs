//! Shared fixtures for integration tests: a scripted command runner and
//! session builders over temporary directories.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use hugetest_matrix::compose::{EnvironmentComposer, Invocation, Verbosity};
use hugetest_matrix::invoker::{CommandRunner, Completion, TestInvoker};
use hugetest_matrix::matrix::{PageSize, WordSize};
use hugetest_matrix::resolver::{
    LinkCompatibilitySet, MountRegistry, Resolution, Resolver, ValidityTable,
};
use hugetest_matrix::session::Session;
use tokio_util::sync::CancellationToken;

type Script = dyn Fn(&Invocation) -> Completion + Send + Sync;

/// Runner that answers from a closure and records every invocation.
pub struct ScriptedRunner {
    script: Box<Script>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&Invocation) -> Completion + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Every command exits 0.
    pub fn passing() -> Arc<Self> {
        Self::new(|_| Completion::exited(0, "PASS"))
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// `program args...` of every call, in order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| std::iter::once(c.program.clone()).chain(c.args.clone()).collect::<Vec<_>>().join(" "))
            .collect()
    }
}

#[async_trait::async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Completion {
        self.calls.lock().unwrap().push(invocation.clone());
        (self.script)(invocation)
    }
}

pub fn page(bytes: u64) -> PageSize {
    PageSize::new(bytes).unwrap()
}

/// Temporary test root with build output directories for `words`.
pub fn work_dir(words: &[WordSize]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for w in words {
        std::fs::create_dir(dir.path().join(w.obj_dir())).unwrap();
    }
    dir
}

/// Word size an invocation was composed for, read from its search path.
pub fn word_of(invocation: &Invocation) -> Option<WordSize> {
    let text = invocation.env.to_string();
    WordSize::ALL
        .into_iter()
        .find(|w| text.contains(&format!("./obj{}", w.bits())))
}

pub struct SessionBuilder<'a> {
    runner: Arc<ScriptedRunner>,
    root: &'a Path,
    validity: ValidityTable,
    mounts: MountRegistry,
    link: Option<LinkCompatibilitySet>,
    uid: Option<u32>,
    cancel: CancellationToken,
}

impl<'a> SessionBuilder<'a> {
    pub fn new(runner: Arc<ScriptedRunner>, root: &'a Path, validity: ValidityTable) -> Self {
        Self {
            runner,
            root,
            validity,
            mounts: MountRegistry::new(),
            link: None,
            uid: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn link(mut self, words: &[WordSize]) -> Self {
        self.link = Some(words.iter().copied().collect());
        self
    }

    pub fn mount(mut self, mount: &Path, uid: u32) -> Self {
        self.mounts.register(mount);
        self.uid = Some(uid);
        self
    }

    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Session {
        let composer = EnvironmentComposer::new(Verbosity::default(), self.root);
        let runner: Arc<dyn CommandRunner> = self.runner;
        let resolver = Resolver::new(runner.clone(), composer.clone());
        let invoker = TestInvoker::new(runner, composer, self.cancel);
        let resolution = Resolution {
            validity: self.validity,
            mounts: self.mounts,
        };
        let session = Session::new(invoker, resolver, resolution, WordSize::ALL.to_vec())
            .with_uid(self.uid);
        match self.link {
            Some(link) => session.with_link_set(link),
            None => session,
        }
    }
}
