//! Worker control protocol
//!
//! Controller → worker: a task object or `{"action": "quit"}`.
//! Worker → controller: `{"status": "ready", "pid": ...}` once after start,
//! then one `{"status": "success"|"failure"|"error", "pid": ..., "details": ...}`
//! per task.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use texbake_core::{BakeTask, BakeType, ContentHash, DecalSpec, TaskId};

/// Control commands understood by workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Leave the task loop and exit cleanly
    Quit,
}

/// Messages sent from the controller to a worker process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControllerMessage {
    Control(ControlCommand),
    Task(Box<TaskMessage>),
}

impl ControllerMessage {
    pub fn quit() -> Self {
        ControllerMessage::Control(ControlCommand::Quit)
    }
}

/// Wire form of one bake task, annotated with dispatch-time references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: TaskId,
    pub object_name: String,
    pub material_name: String,
    pub material_uuid: Uuid,
    pub bake_type: BakeType,
    pub target_socket_name: String,
    pub is_value_bake: bool,
    pub is_color_data: bool,
    pub resolution_x: u32,
    pub resolution_y: u32,
    pub uv_layer: Option<String>,
    pub output_path: PathBuf,
    pub bake_dir: PathBuf,
    pub bake_method: String,
    pub material_hash: ContentHash,
    #[serde(alias = "task_blend_file")]
    pub task_bundle_file: PathBuf,
    /// Image datablock name → file path overrides. Tiled images map to a
    /// template path containing `<UDIM>`.
    #[serde(default)]
    pub texture_translation_map: BTreeMap<String, PathBuf>,
    pub global_task_number: usize,
    pub total_tasks: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub udim_tiles: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decal: Option<DecalSpec>,
}

impl TaskMessage {
    /// Annotate a task with its dispatch references.
    ///
    /// Returns `None` when the task has not been isolated yet; a task without
    /// a bundle cannot be loaded by a worker.
    pub fn for_task(
        task: &BakeTask,
        bake_dir: impl Into<PathBuf>,
        bake_method: impl Into<String>,
        texture_translation_map: BTreeMap<String, PathBuf>,
        global_task_number: usize,
        total_tasks: usize,
    ) -> Option<Self> {
        let bundle = task.bundle_path()?.to_path_buf();
        Some(Self {
            task_id: task.id,
            object_name: task.object_name.clone(),
            material_name: task.material.name.clone(),
            material_uuid: task.material.uuid,
            bake_type: task.bake_type,
            target_socket_name: task.channel.clone(),
            is_value_bake: task.is_value,
            is_color_data: task.is_color_data,
            resolution_x: task.resolution.width,
            resolution_y: task.resolution.height,
            uv_layer: task.uv_layer.clone(),
            output_path: task.output_path.clone(),
            bake_dir: bake_dir.into(),
            bake_method: bake_method.into(),
            material_hash: task.content_hash.clone(),
            task_bundle_file: bundle,
            texture_translation_map,
            global_task_number,
            total_tasks,
            udim_tiles: task.udim_tiles.clone(),
            decal: task.decal.clone(),
        })
    }
}

/// Outcome of a task as reported by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    /// The bake itself failed
    Failure,
    /// The worker could not process the message or hit an unexpected panic
    Error,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failure => write!(f, "failure"),
            TaskStatus::Error => write!(f, "error"),
        }
    }
}

/// Result payload of one processed task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub pid: u32,
    #[serde(default)]
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

/// Messages sent from worker processes to the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerReply {
    /// Worker finished its startup and waits for tasks
    Ready { pid: u32 },
    Success(TaskReport),
    Failure(TaskReport),
    Error(TaskReport),
}

impl WorkerReply {
    pub fn result(status: TaskStatus, report: TaskReport) -> Self {
        match status {
            TaskStatus::Success => WorkerReply::Success(report),
            TaskStatus::Failure => WorkerReply::Failure(report),
            TaskStatus::Error => WorkerReply::Error(report),
        }
    }

    pub fn pid(&self) -> u32 {
        match self {
            WorkerReply::Ready { pid } => *pid,
            WorkerReply::Success(r) | WorkerReply::Failure(r) | WorkerReply::Error(r) => r.pid,
        }
    }

    /// Task status and report for result messages, `None` for readiness
    pub fn task_result(&self) -> Option<(TaskStatus, &TaskReport)> {
        match self {
            WorkerReply::Ready { .. } => None,
            WorkerReply::Success(r) => Some((TaskStatus::Success, r)),
            WorkerReply::Failure(r) => Some((TaskStatus::Failure, r)),
            WorkerReply::Error(r) => Some((TaskStatus::Error, r)),
        }
    }
}
