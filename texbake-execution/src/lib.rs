//! Export execution for texbake
//!
//! This crate runs bake tasks on a pool of external worker processes: the
//! pool controller and its worker slots, the process launcher and output
//! readers, resource sampling for scale-down, scratch directories, and the
//! export orchestration that ties the pipeline to the pool.

pub mod controller;
pub mod error;
pub mod export;
pub mod monitor;
pub mod queue;
pub mod scratch;
pub mod worker;

// Re-export main types
pub use controller::{
    CancelHandle, DispatchContext, PoolController, PoolState, RunReport, TaskFailure,
};
pub use error::{ExecutionError, ExecutionResult};
pub use export::{ExportHost, ExportReport, Exporter, FinalizeInput, Finalizer};
pub use monitor::{ResourceMonitor, ResourceSample, SysinfoMonitor};
pub use queue::MasterQueue;
pub use scratch::{cleanup_orphans, ExportFolder, ScratchLayout, LOCK_FILE_NAME};
pub use worker::{
    spawn_log_reader, spawn_reply_reader, worker_id, ChildWorker, ProcessLauncher, SlotStatus,
    WorkerEvent, WorkerEventKind, WorkerEventSender, WorkerLauncher, WorkerProcess, WorkerSlot,
};
