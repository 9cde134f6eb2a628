//! Worker pool controller
//!
//! A single-owner state machine driven by a periodic tick:
//!
//! ```text
//! Initializing -> RampingUp -> Stabilizing -> Running -> Finishing -> Done
//!                                                              \-> Cancelled
//! ```
//!
//! Reader tasks only forward worker output into an event channel; the tick
//! drains that channel, detects crashed and stalled workers, applies the
//! resource policy and dispatches queued tasks to ready workers. No pool
//! state is touched anywhere else.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use texbake_caching::{ChannelMap, SharedCacheStore};
use texbake_config::PoolConfig;
use texbake_core::{BakeTask, ContentHash, TaskId};
use texbake_ipc::{ControllerMessage, TaskMessage, TaskStatus, WorkerReply};
use texbake_resilience::{EscalationTimeouts, ProcessShutdownManager};

use crate::error::{ExecutionError, ExecutionResult};
use crate::monitor::ResourceMonitor;
use crate::queue::MasterQueue;
use crate::worker::{
    SlotStatus, WorkerEvent, WorkerEventKind, WorkerEventSender, WorkerLauncher, WorkerProcess,
    WorkerSlot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Initializing,
    RampingUp,
    Stabilizing,
    Running,
    Finishing,
    Done,
    Cancelled,
}

impl PoolState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PoolState::Done | PoolState::Cancelled)
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolState::Initializing => "initializing",
            PoolState::RampingUp => "ramping_up",
            PoolState::Stabilizing => "stabilizing",
            PoolState::Running => "running",
            PoolState::Finishing => "finishing",
            PoolState::Done => "done",
            PoolState::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Cloneable cancellation flag shared between the caller and a running pool
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Clear a previous cancellation before the next run
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Run-wide references attached to every dispatched task
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    pub bake_dir: PathBuf,
    pub bake_method: String,
    pub texture_maps: HashMap<TaskId, BTreeMap<String, PathBuf>>,
}

/// A task whose worker reported `failure` or `error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub task: TaskId,
    pub label: String,
    pub status: TaskStatus,
    pub details: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub requeues: usize,
    pub stalls: usize,
    pub scale_downs: usize,
    pub relaunches: u32,
    pub elapsed: Duration,
    pub failures: Vec<TaskFailure>,
}

impl RunReport {
    /// Report of a run that had nothing to bake
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pressure {
    Cpu,
    Ram,
}

enum SlotCheck {
    Healthy,
    Exited(String),
    Stalled(Duration),
    NeverReady(Duration),
}

pub struct PoolController {
    config: PoolConfig,
    launcher: Box<dyn WorkerLauncher>,
    monitor: Box<dyn ResourceMonitor>,
    cache: SharedCacheStore,
    /// Baked textures of this run, committed to the cache only when every
    /// task succeeded
    staged: HashMap<ContentHash, ChannelMap>,
    dispatch: DispatchContext,
    cancel: CancelHandle,
    forward_logs: bool,

    state: PoolState,
    queue: MasterQueue,
    ordinals: HashMap<TaskId, usize>,
    slots: Vec<WorkerSlot>,
    events_tx: WorkerEventSender,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,

    total: usize,
    finished: usize,
    succeeded: usize,
    failures: Vec<TaskFailure>,
    sustained_high: u32,
    scale_downs: usize,
    stalls: usize,
    relaunches: u32,
    started: Instant,
}

impl PoolController {
    pub fn new(
        config: PoolConfig,
        launcher: Box<dyn WorkerLauncher>,
        monitor: Box<dyn ResourceMonitor>,
        cache: SharedCacheStore,
        dispatch: DispatchContext,
        tasks: Vec<BakeTask>,
    ) -> Self {
        let ordinals = tasks
            .iter()
            .enumerate()
            .map(|(i, task)| (task.id, i + 1))
            .collect();
        let total = tasks.len();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            config,
            launcher,
            monitor,
            cache,
            staged: HashMap::new(),
            dispatch,
            cancel: CancelHandle::new(),
            forward_logs: true,
            state: PoolState::Initializing,
            queue: MasterQueue::new(tasks),
            ordinals,
            slots: Vec::new(),
            events_tx,
            events_rx,
            total,
            finished: 0,
            succeeded: 0,
            failures: Vec::new(),
            sustained_high: 0,
            scale_downs: 0,
            stalls: 0,
            relaunches: 0,
            started: Instant::now(),
        }
    }

    /// Observe an externally owned cancellation flag
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Re-emit worker stderr at info level; otherwise only at trace
    pub fn with_log_forwarding(mut self, forward: bool) -> Self {
        self.forward_logs = forward;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn slots(&self) -> &[WorkerSlot] {
        &self.slots
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn finished(&self) -> usize {
        self.finished
    }

    pub fn live_workers(&self) -> usize {
        self.slots.iter().filter(|s| s.status.is_live()).count()
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failures.len(),
            requeues: self.queue.requeue_count(),
            stalls: self.stalls,
            scale_downs: self.scale_downs,
            relaunches: self.relaunches,
            elapsed: self.started.elapsed(),
            failures: self.failures.clone(),
        }
    }

    /// Drive the pool until every task has finished, the run is cancelled
    /// or the pool fails. Worker processes are shut down on every path.
    pub async fn run(mut self) -> ExecutionResult<RunReport> {
        info!(
            tasks = self.total,
            initial_workers = self.config.initial_workers,
            "Starting worker pool"
        );
        let mut cancel_rx = self.cancel.subscribe();
        let mut interval = tokio::time::interval(self.config.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = cancel_rx.changed() => {}
            }

            match self.tick().await {
                Ok(PoolState::Finishing) => break self.finish(),
                Ok(PoolState::Cancelled) => break Err(ExecutionError::Cancelled),
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Worker pool failed");
                    self.transition(PoolState::Cancelled);
                    break Err(e);
                }
            }
        };

        self.shutdown().await;
        outcome
    }

    /// One scheduler pass
    pub async fn tick(&mut self) -> ExecutionResult<PoolState> {
        if self.state.is_terminal() || self.state == PoolState::Finishing {
            return Ok(self.state);
        }
        if self.cancel.is_cancelled() {
            info!("Cancellation requested");
            self.transition(PoolState::Cancelled);
            return Ok(self.state);
        }

        self.drain_events();
        self.check_workers().await;

        match self.state {
            PoolState::Initializing => {
                if self.total == 0 {
                    self.transition(PoolState::Finishing);
                    return Ok(self.state);
                }
                self.transition(PoolState::RampingUp);
            }
            PoolState::RampingUp => {
                self.ramp_up().await;
                self.transition(PoolState::Stabilizing);
            }
            PoolState::Stabilizing => {
                let threshold = self.config.stabilize_tasks.min(self.total);
                if self.finished >= threshold {
                    self.transition(PoolState::Running);
                }
            }
            PoolState::Running => self.apply_resource_policy().await,
            _ => {}
        }

        if matches!(self.state, PoolState::Stabilizing | PoolState::Running) {
            if self.finished >= self.total {
                self.transition(PoolState::Finishing);
            } else {
                self.ensure_capacity().await?;
                self.dispatch_ready().await?;
            }
        }

        Ok(self.state)
    }

    fn transition(&mut self, next: PoolState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Pool state change");
            self.state = next;
        }
    }

    fn finish(&mut self) -> ExecutionResult<RunReport> {
        let report = self.report();
        if let Some(first) = self.failures.first() {
            error!(
                failed = report.failed,
                total = report.total,
                "Bake tasks failed, aborting export"
            );
            let first = format!("{}: {}", first.label, first.details);
            debug!(discarded = self.staged.len(), "Dropping staged results of the failed run");
            self.staged.clear();
            self.transition(PoolState::Cancelled);
            return Err(ExecutionError::TasksFailed {
                failed: report.failed,
                total: report.total,
                first,
            });
        }

        for (hash, channels) in self.staged.drain() {
            self.cache.extend(&hash, channels);
        }
        self.transition(PoolState::Done);
        info!(
            tasks = report.total,
            requeues = report.requeues,
            scale_downs = report.scale_downs,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "All bake tasks finished"
        );
        Ok(report)
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        let Some(worker) = self.slots.get(event.slot).map(|s| s.id.clone()) else {
            warn!(slot = event.slot, "Event from unknown worker slot");
            return;
        };

        match event.kind {
            WorkerEventKind::Log(line) if self.forward_logs => {
                info!(target: "texbake::worker", worker = %worker, "{}", line);
            }
            WorkerEventKind::Log(line) => {
                trace!(target: "texbake::worker", worker = %worker, "{}", line);
            }
            WorkerEventKind::Malformed(line) => {
                warn!(worker = %worker, line = %line, "Unparseable worker output");
            }
            WorkerEventKind::Closed => {
                debug!(worker = %worker, "Worker output stream closed");
            }
            WorkerEventKind::Reply(reply) => self.handle_reply(event.slot, reply),
        }
    }

    fn handle_reply(&mut self, index: usize, reply: WorkerReply) {
        let slot = &mut self.slots[index];
        if let Some(pid) = slot.pid {
            if pid != reply.pid() {
                warn!(
                    worker = %slot.id,
                    expected = pid,
                    reported = reply.pid(),
                    "Worker reported an unexpected pid"
                );
            }
        }

        let Some((status, report)) = reply.task_result() else {
            if slot.status == SlotStatus::Launching {
                info!(worker = %slot.id, pid = reply.pid(), "Worker ready");
                slot.status = SlotStatus::Ready;
                slot.ready_at = Some(Instant::now());
            } else {
                debug!(worker = %slot.id, status = ?slot.status, "Ignoring repeated readiness");
            }
            return;
        };

        let Some(task) = slot.take_task() else {
            warn!(worker = %slot.id, "Result from a worker without a task in flight");
            return;
        };
        if let Some(reported) = report.task_id {
            if reported != task.id {
                warn!(worker = %slot.id, expected = %task.id, reported = %reported, "Result for a different task");
            }
        }
        if slot.status == SlotStatus::Running {
            slot.status = SlotStatus::Ready;
        }

        self.finished += 1;
        let ordinal = self.ordinals.get(&task.id).copied().unwrap_or_default();
        match status {
            TaskStatus::Success => {
                slot.completed += 1;
                self.succeeded += 1;
                self.staged
                    .entry(task.content_hash.clone())
                    .or_default()
                    .insert(task.channel.clone(), task.output_path.clone());
                info!(
                    worker = %slot.id,
                    task = %task.label(),
                    "Baked task {}/{}",
                    ordinal,
                    self.total
                );
            }
            TaskStatus::Failure | TaskStatus::Error => {
                slot.failed += 1;
                warn!(
                    worker = %slot.id,
                    task = %task.label(),
                    status = %status,
                    details = %report.details,
                    "Bake task {}/{} failed",
                    ordinal,
                    self.total
                );
                self.failures.push(TaskFailure {
                    task: task.id,
                    label: task.label(),
                    status,
                    details: report.details.clone(),
                });
            }
        }
    }

    async fn check_workers(&mut self) {
        let stall_timeout = self.config.stall_timeout;
        let ready_timeout = self.config.ready_timeout;
        for index in 0..self.slots.len() {
            let check = {
                let slot = &mut self.slots[index];
                if !slot.status.is_live() {
                    continue;
                }
                let running = slot.status == SlotStatus::Running;
                let elapsed = slot.task_elapsed();
                let waiting = slot.waiting_for_ready();
                match slot.process.as_mut().map(|p| p.try_wait()) {
                    None => SlotCheck::Exited("no process handle".to_string()),
                    Some(Ok(Some(status))) => SlotCheck::Exited(status.to_string()),
                    Some(Err(e)) => SlotCheck::Exited(format!("wait failed: {}", e)),
                    Some(Ok(None)) => match (elapsed, waiting) {
                        (Some(elapsed), _) if running && elapsed > stall_timeout => {
                            SlotCheck::Stalled(elapsed)
                        }
                        (_, Some(waiting)) if waiting > ready_timeout => {
                            SlotCheck::NeverReady(waiting)
                        }
                        _ => SlotCheck::Healthy,
                    },
                }
            };

            match check {
                SlotCheck::Healthy => {}
                SlotCheck::Exited(reason) => {
                    warn!(worker = %self.slots[index].id, reason = %reason, "Worker exited unexpectedly");
                    self.suspend(index).await;
                }
                SlotCheck::Stalled(elapsed) => {
                    warn!(
                        worker = %self.slots[index].id,
                        elapsed_secs = elapsed.as_secs(),
                        "Worker stalled, terminating"
                    );
                    self.stalls += 1;
                    self.suspend(index).await;
                }
                SlotCheck::NeverReady(waited) => {
                    warn!(
                        worker = %self.slots[index].id,
                        waited_ms = waited.as_millis() as u64,
                        "Worker never reported ready, treating as failed launch"
                    );
                    self.suspend(index).await;
                    self.slots[index].status = SlotStatus::Failed;
                }
            }
        }
    }

    /// Kill a crashed, stalled or unreachable worker and requeue its task
    async fn suspend(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.status = SlotStatus::Suspended;
        if let Some(task) = slot.take_task() {
            info!(worker = %slot.id, task = %task.label(), "Requeueing task");
            self.queue.requeue(task);
        }

        let Some(mut process) = slot.process.take() else {
            return;
        };
        if let Err(e) = process.start_kill() {
            debug!(worker = %slot.id, error = %e, "Kill of suspended worker failed");
        }
        if tokio::time::timeout(self.config.terminate_wait, process.wait())
            .await
            .is_err()
        {
            warn!(worker = %slot.id, "Suspended worker did not exit in time");
        }
        process.join_readers(self.config.reader_join_timeout).await;
    }

    async fn launch_slot(&mut self) -> bool {
        let index = self.slots.len();
        match self.launcher.launch(index, self.events_tx.clone()).await {
            Ok(process) => {
                info!(worker = %process.id(), pid = ?process.pid(), "Launched worker");
                self.slots.push(WorkerSlot::launched(index, process));
                true
            }
            Err(e) => {
                error!(slot = index, error = %e, "Failed to launch worker");
                self.slots.push(WorkerSlot::failed(index));
                false
            }
        }
    }

    async fn ramp_up(&mut self) {
        let count = self
            .config
            .initial_workers
            .min(self.total)
            .min(self.config.max_workers);
        info!(workers = count, tasks = self.total, "Ramping up worker pool");
        for _ in 0..count {
            self.launch_slot().await;
        }
    }

    /// Launch a replacement when no live worker is left
    async fn ensure_capacity(&mut self) -> ExecutionResult<()> {
        if self.live_workers() > 0 {
            return Ok(());
        }

        while self.relaunches < self.config.max_relaunches {
            self.relaunches += 1;
            warn!(
                attempt = self.relaunches,
                max = self.config.max_relaunches,
                "No live workers left, launching a replacement"
            );
            if self.launch_slot().await {
                return Ok(());
            }
        }

        Err(ExecutionError::PoolExhausted {
            relaunches: self.relaunches,
            remaining: self.total - self.finished,
        })
    }

    async fn dispatch_ready(&mut self) -> ExecutionResult<()> {
        for index in 0..self.slots.len() {
            if self.queue.is_empty() {
                break;
            }
            let slot = &self.slots[index];
            if slot.status != SlotStatus::Ready || slot.process.is_none() {
                continue;
            }
            let Some(task) = self.queue.pop() else {
                break;
            };

            let ordinal = self.ordinals.get(&task.id).copied().unwrap_or_default();
            let map = self
                .dispatch
                .texture_maps
                .get(&task.id)
                .cloned()
                .unwrap_or_default();
            let Some(message) = TaskMessage::for_task(
                &task,
                self.dispatch.bake_dir.clone(),
                self.dispatch.bake_method.clone(),
                map,
                ordinal,
                self.total,
            ) else {
                return Err(ExecutionError::NotIsolated(task.id));
            };
            let message = ControllerMessage::Task(Box::new(message));

            let slot = &mut self.slots[index];
            let Some(process) = slot.process.as_mut() else {
                continue;
            };
            let sent = process.send(&message).await;
            slot.current = Some(task);
            match sent {
                Ok(()) => {
                    debug!(worker = %slot.id, n = ordinal, total = self.total, "Dispatched task");
                    slot.status = SlotStatus::Running;
                    slot.task_started = Some(Instant::now());
                }
                Err(e) if e.is_broken_pipe() => {
                    warn!(worker = %slot.id, error = %e, "Worker stdin closed, worker presumed crashed");
                    self.suspend(index).await;
                }
                Err(e) => {
                    warn!(worker = %slot.id, error = %e, "Failed to write task to worker");
                    self.suspend(index).await;
                }
            }
        }
        Ok(())
    }

    async fn apply_resource_policy(&mut self) {
        let sample = self.monitor.sample();
        let cpu_over = sample.cpu_percent - self.config.high_cpu_percent;
        let ram_over = sample.ram_percent - self.config.high_ram_percent;
        if cpu_over < 0.0 && ram_over < 0.0 {
            self.sustained_high = 0;
            return;
        }

        self.sustained_high += 1;
        debug!(
            cpu = sample.cpu_percent,
            ram = sample.ram_percent,
            consecutive = self.sustained_high,
            "High resource usage"
        );
        if self.sustained_high < self.config.sustained_checks {
            return;
        }
        self.sustained_high = 0;

        let floor = self.config.scale_floor();
        let live = self.live_workers();
        if live <= floor {
            debug!(live, floor, "Pool at its floor, not scaling down");
            return;
        }

        let pressure = if cpu_over >= 0.0 && (ram_over < 0.0 || cpu_over >= ram_over) {
            Pressure::Cpu
        } else {
            Pressure::Ram
        };
        if let Some(victim) = self.pick_victim(pressure) {
            warn!(
                worker = %self.slots[victim].id,
                pressure = ?pressure,
                cpu = sample.cpu_percent,
                ram = sample.ram_percent,
                "Sustained resource pressure, scaling down"
            );
            self.retire(victim).await;
            self.scale_downs += 1;
        }
    }

    /// Longest-running task under CPU pressure, least productive worker
    /// under RAM pressure
    fn pick_victim(&self, pressure: Pressure) -> Option<usize> {
        let live = || self.slots.iter().filter(|s| s.status.is_live());
        let longest = || {
            live()
                .filter_map(|s| s.task_elapsed().map(|elapsed| (s.index, elapsed)))
                .max_by_key(|(_, elapsed)| *elapsed)
                .map(|(index, _)| index)
        };
        let least_productive = || live().min_by_key(|s| s.completed).map(|s| s.index);

        match pressure {
            Pressure::Cpu => longest().or_else(least_productive),
            Pressure::Ram => least_productive(),
        }
    }

    fn timeouts(&self) -> EscalationTimeouts {
        EscalationTimeouts {
            quit_grace: self.config.quit_grace,
            terminate_wait: self.config.terminate_wait,
        }
    }

    /// Gracefully shut one worker down, requeueing its task
    async fn retire(&mut self, index: usize) {
        let timeouts = self.timeouts();
        let slot = &mut self.slots[index];
        slot.status = SlotStatus::Retired;
        if let Some(task) = slot.take_task() {
            info!(worker = %slot.id, task = %task.label(), "Requeueing task");
            self.queue.requeue(task);
        }

        if let Some(mut process) = slot.process.take() {
            if let Err(e) = ProcessShutdownManager::shutdown_process(&mut *process, timeouts).await {
                warn!(worker = %slot.id, error = %e, "Worker did not shut down cleanly");
            }
            process.join_readers(self.config.reader_join_timeout).await;
        }
    }

    /// Terminate every remaining worker in parallel and join their readers
    pub async fn shutdown(&mut self) {
        let timeouts = self.timeouts();
        let mut processes: Vec<Box<dyn WorkerProcess>> = Vec::new();
        for slot in &mut self.slots {
            slot.take_task();
            if let Some(process) = slot.process.take() {
                processes.push(process);
            }
            if slot.status.is_live() {
                slot.status = SlotStatus::Retired;
            }
        }
        if processes.is_empty() {
            return;
        }

        info!(workers = processes.len(), "Shutting down worker pool");
        let handles = processes.iter_mut().map(|p| &mut **p).collect::<Vec<_>>();
        let results = ProcessShutdownManager::shutdown_processes(handles, timeouts).await;
        for result in results {
            if let Err(e) = result {
                warn!(error = %e, "Worker did not shut down cleanly");
            }
        }

        for process in &mut processes {
            process.join_readers(self.config.reader_join_timeout).await;
        }
    }
}

impl fmt::Debug for PoolController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolController")
            .field("state", &self.state)
            .field("total", &self.total)
            .field("finished", &self.finished)
            .field("queued", &self.queue.len())
            .field("slots", &self.slots)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::ResourceSample;
    use async_trait::async_trait;
    use texbake_caching::CacheStore;

    struct NoLauncher;

    #[async_trait]
    impl WorkerLauncher for NoLauncher {
        async fn launch(
            &mut self,
            slot: usize,
            _events: WorkerEventSender,
        ) -> ExecutionResult<Box<dyn WorkerProcess>> {
            Err(ExecutionError::Launch {
                worker: crate::worker::worker_id(slot),
                message: "not launched in unit tests".to_string(),
            })
        }
    }

    struct Idle;

    impl ResourceMonitor for Idle {
        fn sample(&mut self) -> ResourceSample {
            ResourceSample::new(0.0, 0.0)
        }
    }

    fn pool_with(slots: Vec<(SlotStatus, u32, Option<u64>)>) -> PoolController {
        let mut pool = PoolController::new(
            PoolConfig::default(),
            Box::new(NoLauncher),
            Box::new(Idle),
            CacheStore::shared(),
            DispatchContext::default(),
            Vec::new(),
        );
        let now = Instant::now();
        for (index, (status, completed, running_secs)) in slots.into_iter().enumerate() {
            let mut slot = WorkerSlot::failed(index);
            slot.status = status;
            slot.completed = completed;
            slot.task_started = running_secs.map(|secs| now - Duration::from_secs(secs));
            pool.slots.push(slot);
        }
        pool
    }

    #[test]
    fn test_victim_selection_by_pressure() {
        let pool = pool_with(vec![
            (SlotStatus::Running, 5, Some(30)),
            (SlotStatus::Running, 1, Some(5)),
            (SlotStatus::Ready, 3, None),
            (SlotStatus::Suspended, 0, Some(60)),
        ]);
        assert_eq!(pool.pick_victim(Pressure::Cpu), Some(0));
        assert_eq!(pool.pick_victim(Pressure::Ram), Some(1));
    }

    #[test]
    fn test_cpu_victim_without_running_tasks_falls_back_to_least_productive() {
        let pool = pool_with(vec![
            (SlotStatus::Ready, 4, None),
            (SlotStatus::Launching, 0, None),
            (SlotStatus::Retired, 0, None),
        ]);
        assert_eq!(pool.pick_victim(Pressure::Cpu), Some(1));
        assert_eq!(pool_with(Vec::new()).pick_victim(Pressure::Ram), None);
    }

    #[test]
    fn test_cancel_handle_is_shared() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        let rx = handle.subscribe();

        clone.cancel();
        assert!(handle.is_cancelled());
        assert!(*rx.borrow());

        handle.reset();
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn test_terminal_states() {
        assert!(PoolState::Done.is_terminal());
        assert!(PoolState::Cancelled.is_terminal());
        assert!(!PoolState::Finishing.is_terminal());
        assert_eq!(PoolState::RampingUp.to_string(), "ramping_up");
    }
}
