//! Single-run guard and cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::error::PipelineError;
use crate::pipeline::types::RunStage;

/// Admits at most one pipeline run at a time.
///
/// Cloning shares the same guard.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    inner: Arc<GuardState>,
}

#[derive(Debug, Default)]
struct GuardState {
    active: AtomicBool,
    stage: AtomicU8,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, or `Busy` if a run is already active.
    pub fn try_acquire(&self) -> Result<RunToken, PipelineError> {
        self.inner
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::Busy)?;
        self.inner
            .stage
            .store(RunStage::Idle.as_u8(), Ordering::Release);
        Ok(RunToken {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Stage of the active run, `Idle` when none.
    pub fn stage(&self) -> RunStage {
        RunStage::from_u8(self.inner.stage.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }
}

/// Proof of an active run. Dropping it releases the guard.
#[derive(Debug)]
pub struct RunToken {
    inner: Arc<GuardState>,
}

impl RunToken {
    pub fn advance(&self, stage: RunStage) {
        self.inner.stage.store(stage.as_u8(), Ordering::Release);
    }

    pub fn stage(&self) -> RunStage {
        RunStage::from_u8(self.inner.stage.load(Ordering::Acquire))
    }
}

impl Drop for RunToken {
    fn drop(&mut self) {
        self.inner
            .stage
            .store(RunStage::Idle.as_u8(), Ordering::Release);
        self.inner.active.store(false, Ordering::Release);
    }
}

/// Shared cancellation flag, checked between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
