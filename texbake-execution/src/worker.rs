//! Worker processes as seen from the controller
//!
//! A worker is an external process speaking the line protocol on its
//! stdin/stdout. Its two output streams are read by background tasks that
//! only forward lines into the controller's event channel; every decision
//! is taken on the controller's tick.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use texbake_config::PoolConfig;
use texbake_core::BakeTask;
use texbake_ipc::{decode_line, encode_line, ControllerMessage, IpcError, WorkerReply};
use texbake_resilience::GracefulProcess;

use crate::error::{ExecutionError, ExecutionResult};

/// Something a worker's reader task observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEventKind {
    Reply(WorkerReply),
    /// A stdout line that is not a protocol message
    Malformed(String),
    /// A stderr line
    Log(String),
    /// Stdout reached end of stream
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEvent {
    pub slot: usize,
    pub kind: WorkerEventKind,
}

pub type WorkerEventSender = mpsc::UnboundedSender<WorkerEvent>;

/// Forward protocol replies from a worker's stdout
pub fn spawn_reply_reader<R>(slot: usize, stream: R, events: WorkerEventSender) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let kind = match decode_line::<WorkerReply>(&line) {
                        Ok(reply) => WorkerEventKind::Reply(reply),
                        Err(_) => WorkerEventKind::Malformed(line),
                    };
                    if events.send(WorkerEvent { slot, kind }).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(slot, "Worker stdout closed");
                    let _ = events.send(WorkerEvent {
                        slot,
                        kind: WorkerEventKind::Closed,
                    });
                    break;
                }
                Err(e) => {
                    error!(slot, error = %e, "Failed to read worker stdout");
                    let _ = events.send(WorkerEvent {
                        slot,
                        kind: WorkerEventKind::Closed,
                    });
                    break;
                }
            }
        }
    })
}

/// Forward a worker's stderr lines for operator visibility
pub fn spawn_log_reader<R>(slot: usize, stream: R, events: WorkerEventSender) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let event = WorkerEvent {
                slot,
                kind: WorkerEventKind::Log(line),
            };
            if events.send(event).is_err() {
                break;
            }
        }
    })
}

/// Controller-side handle of one worker process
#[async_trait]
pub trait WorkerProcess: GracefulProcess {
    fn id(&self) -> &str;

    /// Write one protocol message to the worker's input stream
    async fn send(&mut self, message: &ControllerMessage) -> Result<(), IpcError>;

    /// Wait for the output reader tasks, aborting any that outlive `limit`
    async fn join_readers(&mut self, limit: Duration);
}

/// Starts worker processes and wires their output to the event channel
#[async_trait]
pub trait WorkerLauncher: Send {
    async fn launch(
        &mut self,
        slot: usize,
        events: WorkerEventSender,
    ) -> ExecutionResult<Box<dyn WorkerProcess>>;
}

pub fn worker_id(slot: usize) -> String {
    format!("worker-{}", slot)
}

async fn join_bounded(handles: Vec<JoinHandle<()>>, limit: Duration, worker: &str) {
    for handle in handles {
        let abort = handle.abort_handle();
        if tokio::time::timeout(limit, handle).await.is_err() {
            warn!(worker, "Reader task did not finish in {:?}, aborting", limit);
            abort.abort();
        }
    }
}

/// A worker running as a child process
#[derive(Debug)]
pub struct ChildWorker {
    id: String,
    child: Child,
    stdin: Option<ChildStdin>,
    readers: Vec<JoinHandle<()>>,
    write_timeout: Duration,
}

#[async_trait]
impl GracefulProcess for ChildWorker {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    async fn request_exit(&mut self) -> std::io::Result<()> {
        let Some(mut stdin) = self.stdin.take() else {
            return Ok(());
        };
        let line = encode_line(&ControllerMessage::quit())
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        // dropping stdin closes the stream
        Ok(())
    }

    async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    fn start_kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }
}

#[async_trait]
impl WorkerProcess for ChildWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&mut self, message: &ControllerMessage) -> Result<(), IpcError> {
        let stdin = self.stdin.as_mut().ok_or(IpcError::NotConnected)?;
        let line = encode_line(message)?;
        let write = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        };
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result.map_err(IpcError::from),
            Err(_) => Err(IpcError::Timeout),
        }
    }

    async fn join_readers(&mut self, limit: Duration) {
        let handles = std::mem::take(&mut self.readers);
        join_bounded(handles, limit, &self.id).await;
    }
}

/// Spawns `<program> [args..] --worker --worker-id <id>` child processes
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
    write_timeout: Duration,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, write_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            write_timeout,
        }
    }

    /// Launcher for the configured worker program, defaulting to the
    /// current executable
    pub fn from_config(config: &PoolConfig) -> ExecutionResult<Self> {
        let program = match &config.worker_program {
            Some(program) => program.clone(),
            None => std::env::current_exe().map_err(|e| ExecutionError::Launch {
                worker: "-".to_string(),
                message: format!("Failed to get current exe: {}", e),
            })?,
        };
        Ok(Self::new(program, config.worker_args.clone(), config.write_timeout))
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(
        &mut self,
        slot: usize,
        events: WorkerEventSender,
    ) -> ExecutionResult<Box<dyn WorkerProcess>> {
        let id = worker_id(slot);
        debug!(worker = %id, program = %self.program.display(), "Spawning worker process");

        let launch_error = |message: String| ExecutionError::Launch {
            worker: id.clone(),
            message,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--worker")
            .arg("--worker-id")
            .arg(&id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| launch_error(format!("Failed to spawn worker: {}", e)))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_error("Failed to get stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| launch_error("Failed to get stderr".to_string()))?;

        let readers = vec![
            spawn_reply_reader(slot, stdout, events.clone()),
            spawn_log_reader(slot, stderr, events),
        ];

        Ok(Box::new(ChildWorker {
            id,
            child,
            stdin,
            readers,
            write_timeout: self.write_timeout,
        }))
    }
}

/// Scheduling status of a worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// Spawned, readiness not yet reported
    Launching,
    Ready,
    Running,
    /// Crashed or stalled; the slot is not reused
    Suspended,
    /// Shut down by scale-down or at the end of the run
    Retired,
    /// Could not be launched
    Failed,
}

impl SlotStatus {
    /// The slot still owns a live process that counts towards capacity
    pub fn is_live(self) -> bool {
        matches!(self, SlotStatus::Launching | SlotStatus::Ready | SlotStatus::Running)
    }
}

/// One position in the worker pool
pub struct WorkerSlot {
    pub index: usize,
    pub id: String,
    pub status: SlotStatus,
    pub pid: Option<u32>,
    pub process: Option<Box<dyn WorkerProcess>>,
    pub current: Option<BakeTask>,
    pub launched_at: Option<Instant>,
    pub ready_at: Option<Instant>,
    pub task_started: Option<Instant>,
    pub completed: u32,
    pub failed: u32,
}

impl WorkerSlot {
    pub fn launched(index: usize, process: Box<dyn WorkerProcess>) -> Self {
        Self {
            index,
            id: process.id().to_string(),
            status: SlotStatus::Launching,
            pid: process.pid(),
            process: Some(process),
            current: None,
            launched_at: Some(Instant::now()),
            ready_at: None,
            task_started: None,
            completed: 0,
            failed: 0,
        }
    }

    pub fn failed(index: usize) -> Self {
        Self {
            index,
            id: worker_id(index),
            status: SlotStatus::Failed,
            pid: None,
            process: None,
            current: None,
            launched_at: None,
            ready_at: None,
            task_started: None,
            completed: 0,
            failed: 0,
        }
    }

    /// Time spent waiting for readiness, while still launching
    pub fn waiting_for_ready(&self) -> Option<Duration> {
        match (self.status, self.launched_at) {
            (SlotStatus::Launching, Some(launched)) => Some(launched.elapsed()),
            _ => None,
        }
    }

    /// How long the current task has been running
    pub fn task_elapsed(&self) -> Option<Duration> {
        self.task_started.map(|started| started.elapsed())
    }

    /// Hand out the in-flight task, if any
    pub fn take_task(&mut self) -> Option<BakeTask> {
        self.task_started = None;
        self.current.take()
    }
}

impl std::fmt::Debug for WorkerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSlot")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("status", &self.status)
            .field("pid", &self.pid)
            .field("current", &self.current.as_ref().map(|t| t.id))
            .field("completed", &self.completed)
            .field("failed", &self.failed)
            .finish()
    }
}
