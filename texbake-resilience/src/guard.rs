//! Scoped reentrancy guard for export runs

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    /// Another holder owns the run lock
    #[error("run lock is already held")]
    Held,
}

/// Flag owned by whatever orchestrates exports. At most one [`RunGuard`]
/// exists per lock at a time.
#[derive(Debug, Clone, Default)]
pub struct RunLock {
    held: Arc<AtomicBool>,
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for the duration of the returned guard
    pub fn try_acquire(&self) -> Result<RunGuard, GuardError> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| GuardError::Held)?;
        debug!("Run lock acquired");
        Ok(RunGuard {
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases its [`RunLock`] when dropped, on every exit path
#[derive(Debug)]
pub struct RunGuard {
    held: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
        debug!("Run lock released");
    }
}
