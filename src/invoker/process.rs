//! Subprocess execution behind the `CommandRunner` seam.

use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::compose::Invocation;
use crate::matrix::{classify, Outcome};

/// Exit status reported by a shell when the command could not be started.
pub const SPAWN_FAILURE_STATUS: i32 = 127;

const SIGINT: i32 = 2;

/// How a subprocess ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Exited(i32),
    Signaled(i32),
    /// The harness was cancelled while waiting; the child was killed.
    Interrupted,
}

impl RunStatus {
    /// Numeric status in shell convention (`128 + signal` for signals).
    pub fn exit_code(self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(code),
            Self::Signaled(sig) => Some(128 + sig),
            Self::Interrupted => None,
        }
    }

    pub fn outcome(self) -> Outcome {
        match self.exit_code() {
            Some(code) => classify(code),
            None => Outcome::Interrupted,
        }
    }
}

/// Result of running one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub status: RunStatus,
    /// Captured stdout followed by stderr, trimmed.
    pub output: String,
}

impl Completion {
    pub fn exited(code: i32, output: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Exited(code),
            output: output.into(),
        }
    }
}

/// Runs composed invocations. Implementations block the caller until the
/// child is gone.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Completion;
}

/// Spawns real processes and kills them when the harness is interrupted.
pub struct ProcessRunner {
    cancel: CancellationToken,
}

impl ProcessRunner {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    fn command(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.current_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in invocation.env.resolve(|k| std::env::var(k).ok()) {
            match value {
                Some(v) => cmd.env(key, v),
                None => cmd.env_remove(key),
            };
        }
        cmd
    }
}

#[async_trait::async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Completion {
        if self.cancel.is_cancelled() {
            return Completion {
                status: RunStatus::Interrupted,
                output: String::new(),
            };
        }

        let mut child = match Self::command(invocation).spawn() {
            Ok(child) => child,
            Err(e) => {
                return Completion::exited(
                    SPAWN_FAILURE_STATUS,
                    format!("{}: {}", invocation.program, e),
                )
            }
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let finished = {
            let wait = async {
                let (out, err, status) =
                    tokio::join!(read_all(stdout), read_all(stderr), child.wait());
                (out, err, status)
            };
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                done = wait => Some(done),
            }
        };

        let Some((out, err, status)) = finished else {
            if let Err(e) = child.kill().await {
                tracing::warn!(program = %invocation.program, "failed to kill child: {}", e);
            }
            return Completion {
                status: RunStatus::Interrupted,
                output: String::new(),
            };
        };

        // A Ctrl+C reaches the child too. Let a pending listener cancel first.
        tokio::task::yield_now().await;
        let status = match status {
            _ if self.cancel.is_cancelled() => RunStatus::Interrupted,
            Ok(status) => match run_status(status) {
                RunStatus::Signaled(SIGINT) => RunStatus::Interrupted,
                other => other,
            },
            Err(e) => {
                tracing::warn!(program = %invocation.program, "wait failed: {}", e);
                RunStatus::Exited(SPAWN_FAILURE_STATUS)
            }
        };
        let output = format!("{}{}", out, err).trim().to_string();
        Completion { status, output }
    }
}

async fn read_all<R>(pipe: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            tracing::debug!("output capture ended early: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(unix)]
fn run_status(status: ExitStatus) -> RunStatus {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => RunStatus::Exited(code),
        (None, Some(sig)) => RunStatus::Signaled(sig),
        (None, None) => RunStatus::Exited(-1),
    }
}

#[cfg(not(unix))]
fn run_status(status: ExitStatus) -> RunStatus {
    RunStatus::Exited(status.code().unwrap_or(-1))
}
