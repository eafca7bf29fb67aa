//! Interrupt coordination for a harness run.
//!
//! Ctrl+C cancels a shared token. The runner kills the child it is waiting
//! on, the interrupted invocation is recorded, and the remaining sequence
//! unwinds through `HarnessError::Interrupted`.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Run state as seen by the entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Interrupted,
}

/// Exit status of a process stopped by SIGINT, in shell convention.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Owns the cancellation token shared by the runner and the invoker.
#[derive(Debug, Clone, Default)]
pub struct InterruptCoordinator {
    token: CancellationToken,
}

impl InterruptCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to hand to anything that must stop on interrupt.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn state(&self) -> RunState {
        if self.token.is_cancelled() {
            RunState::Interrupted
        } else {
            RunState::Running
        }
    }

    /// Cancel the run.
    pub fn interrupt(&self) {
        if !self.token.is_cancelled() {
            tracing::warn!("interrupt received, killing the current test");
        }
        self.token.cancel();
    }

    /// Spawn a task that interrupts the run on the first Ctrl+C.
    ///
    /// The task ends on its own once the run is cancelled by other means.
    pub fn listen_for_ctrl_c(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => coordinator.interrupt(),
                    Err(e) => tracing::warn!("cannot listen for Ctrl+C: {}", e),
                },
                _ = coordinator.token.cancelled() => {}
            }
        })
    }
}
