//! Worker process loop
//!
//! A worker is long-lived: it announces readiness once, then handles one
//! task line at a time until it receives a quit command or its input
//! closes. Task failures, including panics inside the backend, are reported
//! as results and never end the loop.

use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

use texbake_ipc::{
    ControlCommand, ControllerMessage, IpcError, IpcTransport, TaskMessage, TaskReport, TaskStatus,
    WorkerReply,
};

use crate::backend::BakeBackend;
use crate::error::BakeResult;

/// Counters reported when a worker exits
#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub worker_id: String,
    pub pid: u32,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub tasks_executed: u64,
    pub tasks_failed: u64,
}

/// Worker process implementation
pub struct Worker<B, T> {
    transport: T,
    backend: B,
    stats: WorkerStats,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl<B, T> Worker<B, T>
where
    B: BakeBackend,
    T: IpcTransport,
{
    pub fn new(worker_id: impl Into<String>, transport: T, backend: B) -> Self {
        Self {
            transport,
            backend,
            stats: WorkerStats {
                worker_id: worker_id.into(),
                pid: std::process::id(),
                started_at: chrono::Utc::now(),
                tasks_executed: 0,
                tasks_failed: 0,
            },
        }
    }

    /// Override the reported process id
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.stats.pid = pid;
        self
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Send ready signal to the controller
    pub async fn send_ready(&mut self) -> BakeResult<()> {
        let pid = self.stats.pid;
        self.transport.send(&WorkerReply::Ready { pid }).await?;
        Ok(())
    }

    /// Main worker loop. Returns when told to quit or when the controller
    /// closes the input stream.
    pub async fn run(mut self) -> BakeResult<WorkerStats> {
        loop {
            match self.transport.receive::<ControllerMessage>().await {
                Ok(ControllerMessage::Control(ControlCommand::Quit)) => {
                    info!(worker = %self.stats.worker_id, "Received quit command");
                    break;
                }
                Ok(ControllerMessage::Task(task)) => {
                    let reply = self.process_task(&task);
                    self.transport.send(&reply).await?;
                }
                Err(IpcError::ConnectionClosed) => {
                    info!(worker = %self.stats.worker_id, "Input closed, shutting down");
                    break;
                }
                Err(e @ IpcError::Decode { .. }) => {
                    warn!(worker = %self.stats.worker_id, error = %e, "Malformed task message");
                    self.stats.tasks_failed += 1;
                    let reply = WorkerReply::result(
                        TaskStatus::Error,
                        TaskReport {
                            pid: self.stats.pid,
                            details: e.to_string(),
                            task_id: None,
                        },
                    );
                    self.transport.send(&reply).await?;
                }
                Err(e) => {
                    error!(worker = %self.stats.worker_id, error = %e, "Failed to receive message");
                    return Err(e.into());
                }
            }
        }

        let _ = self.transport.close().await;
        info!(
            worker = %self.stats.worker_id,
            executed = self.stats.tasks_executed,
            failed = self.stats.tasks_failed,
            "Worker shutting down"
        );
        Ok(self.stats)
    }

    /// Load, bake and drop the context of one task. The context never
    /// survives the call.
    fn process_task(&mut self, task: &TaskMessage) -> WorkerReply {
        info!(
            worker = %self.stats.worker_id,
            task = task.global_task_number,
            total = task.total_tasks,
            object = %task.object_name,
            material = %task.material_name,
            channel = %task.target_socket_name,
            "Baking task {}/{}",
            task.global_task_number,
            task.total_tasks
        );
        self.stats.tasks_executed += 1;

        let backend = &self.backend;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut context = backend.load(task)?;
            backend.bake(&mut context, task)
        }));

        let (status, details) = match outcome {
            Ok(Ok(outcome)) => {
                debug!(task = %task.task_id, outputs = outcome.outputs.len(), "Task baked");
                (TaskStatus::Success, outcome.details())
            }
            Ok(Err(e)) => {
                warn!(task = %task.task_id, error = %e, "Bake failed");
                (TaskStatus::Failure, e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(task = %task.task_id, panic = %message, "Bake panicked");
                (TaskStatus::Error, format!("bake panicked: {}", message))
            }
        };

        if status != TaskStatus::Success {
            self.stats.tasks_failed += 1;
        }
        WorkerReply::result(
            status,
            TaskReport {
                pid: self.stats.pid,
                details,
                task_id: Some(task.task_id),
            },
        )
    }
}

/// Worker process entry point: announce readiness, then serve tasks
pub async fn run_worker<B, T>(worker_id: impl Into<String>, transport: T, backend: B) -> BakeResult<WorkerStats>
where
    B: BakeBackend,
    T: IpcTransport,
{
    let worker_id = worker_id.into();
    info!(worker = %worker_id, backend = backend.name(), pid = std::process::id(), "Starting worker process");

    let mut worker = Worker::new(worker_id, transport, backend);
    worker.send_ready().await?;
    worker.run().await
}
