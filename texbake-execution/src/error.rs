//! Error types for export execution

use std::path::PathBuf;
use thiserror::Error;

use texbake_core::{SceneError, SetupError, TaskId};
use texbake_ipc::IpcError;
use texbake_pipeline::IsolationError;
use texbake_resilience::ShutdownError;

/// Export execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Setup failed: {0}")]
    Setup(#[from] SetupError),

    #[error("Task isolation failed: {0}")]
    Isolation(#[from] IsolationError),

    #[error("Failed to launch worker {worker}: {message}")]
    Launch { worker: String, message: String },

    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    #[error("Shutdown error: {0}")]
    Shutdown(#[from] ShutdownError),

    #[error("Task {0} was dispatched without an isolated bundle")]
    NotIsolated(TaskId),

    #[error("Worker pool exhausted after {relaunches} relaunches with {remaining} tasks left")]
    PoolExhausted { relaunches: u32, remaining: usize },

    #[error("{failed} of {total} bake tasks failed; first failure: {first}")]
    TasksFailed {
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("Export cancelled")]
    Cancelled,

    #[error("Host operation failed: {0}")]
    Host(String),

    #[error("Finalization failed: {0}")]
    Finalize(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExecutionError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExecutionError::Io {
            path: path.into(),
            source,
        }
    }

    /// Failures raised before any worker was launched
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, ExecutionError::Setup(_) | ExecutionError::Isolation(_))
    }

    /// Whether the run ended by cancellation rather than an error
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionError::Cancelled)
    }
}

impl From<SceneError> for ExecutionError {
    fn from(err: SceneError) -> Self {
        ExecutionError::Setup(SetupError::Scene(err))
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;
