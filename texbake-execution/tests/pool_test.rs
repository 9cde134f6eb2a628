//! Worker pool scenarios against scripted in-process workers
#![cfg(unix)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;
use uuid::Uuid;

use texbake_caching::{CacheStore, SharedCacheStore};
use texbake_config::PoolConfig;
use texbake_core::{BakeTask, BakeType, ContentHash, MaterialIdentity, Resolution, TaskId};
use texbake_execution::{
    spawn_reply_reader, worker_id, DispatchContext, ExecutionError, ExecutionResult,
    PoolController, PoolState, ResourceMonitor, ResourceSample, SlotStatus, WorkerEventSender,
    WorkerLauncher, WorkerProcess,
};
use texbake_ipc::{
    encode_line, ControllerMessage, IpcError, IpcTransport, LineTransport, TaskReport,
    WorkerReply,
};
use texbake_resilience::GracefulProcess;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Behavior {
    Bake,
    /// Every task takes this long
    Slow(Duration),
    /// Exits as soon as a task arrives
    ExitOnTask,
    /// Never answers a task
    HangOnTask,
    /// Cannot be launched
    Unlaunchable,
    /// Starts but never reports ready
    NeverReady,
}

#[derive(Debug, Clone, PartialEq)]
struct Executed {
    worker: usize,
    number: usize,
}

#[derive(Debug, Clone, Default)]
struct Journal {
    executed: Arc<Mutex<Vec<Executed>>>,
    alive: Arc<AtomicUsize>,
    launches: Arc<AtomicUsize>,
}

impl Journal {
    fn sorted_numbers(&self) -> Vec<usize> {
        let mut numbers: Vec<usize> = self.executed.lock().unwrap().iter().map(|e| e.number).collect();
        numbers.sort();
        numbers
    }

    fn numbers_of(&self, worker: usize) -> Vec<usize> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.worker == worker)
            .map(|e| e.number)
            .collect()
    }

    fn alive(&self) -> usize {
        self.alive.load(Ordering::SeqCst)
    }

    fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

struct AliveGuard(Arc<AtomicUsize>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

type WorkerTransport = LineTransport<BufReader<DuplexStream>, DuplexStream>;

async fn scripted_worker(slot: usize, behavior: Behavior, mut transport: WorkerTransport, journal: Journal) {
    let _alive = AliveGuard(journal.alive.clone());
    let pid = 4000 + slot as u32;
    if behavior == Behavior::NeverReady {
        std::future::pending::<()>().await;
    }
    if transport.send(&WorkerReply::Ready { pid }).await.is_err() {
        return;
    }

    loop {
        let task = match transport.receive::<ControllerMessage>().await {
            Ok(ControllerMessage::Task(task)) => task,
            Ok(ControllerMessage::Control(_)) | Err(_) => return,
        };
        match behavior {
            Behavior::ExitOnTask => return,
            Behavior::HangOnTask => std::future::pending::<()>().await,
            Behavior::Slow(delay) => tokio::time::sleep(delay).await,
            Behavior::Bake | Behavior::Unlaunchable | Behavior::NeverReady => {}
        }

        journal.executed.lock().unwrap().push(Executed {
            worker: slot,
            number: task.global_task_number,
        });
        let report = TaskReport {
            pid,
            details: task.output_path.display().to_string(),
            task_id: Some(task.task_id),
        };
        let reply = if task.target_socket_name == "Fail" {
            WorkerReply::Failure(report)
        } else {
            WorkerReply::Success(report)
        };
        if transport.send(&reply).await.is_err() {
            return;
        }
    }
}

struct FakeProcess {
    id: String,
    stdin: Option<DuplexStream>,
    worker: JoinHandle<()>,
    exited: Option<ExitStatus>,
    readers: Vec<JoinHandle<()>>,
}

#[async_trait]
impl GracefulProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        // no OS process behind it, nothing to signal
        None
    }

    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        if self.exited.is_none() && self.worker.is_finished() {
            self.exited = Some(ExitStatus::from_raw(0));
        }
        Ok(self.exited)
    }

    async fn request_exit(&mut self) -> std::io::Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            let line = encode_line(&ControllerMessage::quit()).map_err(|e| std::io::Error::other(e.to_string()))?;
            stdin.write_all(line.as_bytes()).await?;
        }
        Ok(())
    }

    async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.exited {
            return Ok(status);
        }
        let _ = (&mut self.worker).await;
        let status = ExitStatus::from_raw(0);
        self.exited = Some(status);
        Ok(status)
    }

    fn start_kill(&mut self) -> std::io::Result<()> {
        self.worker.abort();
        Ok(())
    }
}

#[async_trait]
impl WorkerProcess for FakeProcess {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&mut self, message: &ControllerMessage) -> Result<(), IpcError> {
        let stdin = self.stdin.as_mut().ok_or(IpcError::NotConnected)?;
        let line = encode_line(message)?;
        stdin.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn join_readers(&mut self, limit: Duration) {
        for reader in self.readers.drain(..) {
            let _ = tokio::time::timeout(limit, reader).await;
        }
    }
}

struct ScriptedLauncher {
    behaviors: Vec<Behavior>,
    fallback: Behavior,
    journal: Journal,
}

impl ScriptedLauncher {
    fn new(behaviors: Vec<Behavior>, fallback: Behavior, journal: &Journal) -> Box<Self> {
        Box::new(Self {
            behaviors,
            fallback,
            journal: journal.clone(),
        })
    }
}

#[async_trait]
impl WorkerLauncher for ScriptedLauncher {
    async fn launch(&mut self, slot: usize, events: WorkerEventSender) -> ExecutionResult<Box<dyn WorkerProcess>> {
        self.journal.launches.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behaviors.get(slot).copied().unwrap_or(self.fallback);
        if behavior == Behavior::Unlaunchable {
            return Err(ExecutionError::Launch {
                worker: worker_id(slot),
                message: "scripted launch failure".to_string(),
            });
        }

        let (controller_in, worker_in) = tokio::io::duplex(64 * 1024);
        let (worker_out, controller_out) = tokio::io::duplex(64 * 1024);
        self.journal.alive.fetch_add(1, Ordering::SeqCst);

        let transport = LineTransport::new(BufReader::new(worker_in), worker_out);
        let worker = tokio::spawn(scripted_worker(slot, behavior, transport, self.journal.clone()));
        let readers = vec![spawn_reply_reader(slot, controller_out, events)];

        Ok(Box::new(FakeProcess {
            id: worker_id(slot),
            stdin: Some(controller_in),
            worker,
            exited: None,
            readers,
        }))
    }
}

/// Serves queued samples first, then repeats the fallback
struct ScriptedMonitor {
    samples: Arc<Mutex<VecDeque<ResourceSample>>>,
    fallback: ResourceSample,
}

impl ResourceMonitor for ScriptedMonitor {
    fn sample(&mut self) -> ResourceSample {
        self.samples.lock().unwrap().pop_front().unwrap_or(self.fallback)
    }
}

const CALM: ResourceSample = ResourceSample {
    cpu_percent: 10.0,
    ram_percent: 20.0,
};
const CPU_HIGH: ResourceSample = ResourceSample {
    cpu_percent: 99.0,
    ram_percent: 10.0,
};
const RAM_HIGH: ResourceSample = ResourceSample {
    cpu_percent: 10.0,
    ram_percent: 99.0,
};

fn calm() -> Box<ScriptedMonitor> {
    pressured(CALM)
}

fn pressured(sample: ResourceSample) -> Box<ScriptedMonitor> {
    sequence(Vec::new(), sample).0
}

/// Monitor plus a handle on its unconsumed samples
fn sequence(
    samples: Vec<ResourceSample>,
    fallback: ResourceSample,
) -> (Box<ScriptedMonitor>, Arc<Mutex<VecDeque<ResourceSample>>>) {
    let samples = Arc::new(Mutex::new(VecDeque::from(samples)));
    let monitor = Box::new(ScriptedMonitor {
        samples: samples.clone(),
        fallback,
    });
    (monitor, samples)
}

fn channel_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("c{}", i)).collect()
}

fn tasks(channels: &[&str]) -> Vec<BakeTask> {
    channels
        .iter()
        .enumerate()
        .map(|(i, channel)| BakeTask {
            id: TaskId::new(),
            material: MaterialIdentity {
                name: format!("Material{}", i),
                uuid: Uuid::new_v4(),
            },
            object_name: "Cube".to_string(),
            channel: channel.to_string(),
            bake_type: BakeType::Emit,
            output_path: PathBuf::from(format!("/bakes/{}_{}.png", i, channel)),
            resolution: Resolution::new(16, 16),
            uv_layer: None,
            is_value: false,
            is_color_data: true,
            content_hash: ContentHash::new(format!("hash-{}", i)),
            udim_tiles: Vec::new(),
            decal: None,
            bundle_path: None,
        }
        .with_bundle(format!("/bundles/task_{}.bundle.json", i)))
        .collect()
}

fn pool_config(initial: usize) -> PoolConfig {
    PoolConfig {
        initial_workers: initial,
        max_workers: 8,
        stabilize_tasks: 1,
        check_interval: Duration::from_millis(2),
        stall_timeout: Duration::from_secs(30),
        quit_grace: Duration::from_millis(200),
        terminate_wait: Duration::from_millis(50),
        reader_join_timeout: Duration::from_millis(200),
        max_relaunches: 3,
        ..PoolConfig::default()
    }
}

fn controller(
    config: PoolConfig,
    launcher: Box<ScriptedLauncher>,
    monitor: Box<ScriptedMonitor>,
    cache: SharedCacheStore,
    tasks: Vec<BakeTask>,
) -> PoolController {
    let dispatch = DispatchContext {
        bake_dir: PathBuf::from("/bakes"),
        bake_method: "emit".to_string(),
        texture_maps: HashMap::new(),
    };
    PoolController::new(config, launcher, monitor, cache, dispatch, tasks)
}

/// Tick until the pool reaches `Finishing`, tracking the smallest live
/// worker count seen while running
async fn drive_to_finish(pool: &mut PoolController) -> usize {
    let mut min_live = usize::MAX;
    for _ in 0..5000 {
        let state = pool.tick().await.unwrap();
        if state == PoolState::Running {
            min_live = min_live.min(pool.live_workers());
        }
        if state == PoolState::Finishing {
            return min_live;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("pool did not finish: {:?}", pool);
}

#[tokio::test]
async fn test_every_task_completes_and_is_cached() {
    let journal = Journal::default();
    let cache = CacheStore::shared();
    let tasks = tasks(&["Base Color", "Roughness", "Metallic", "Normal", "Alpha", "Emission Color"]);
    let expected: Vec<_> = tasks
        .iter()
        .map(|t| (t.content_hash.clone(), t.channel.clone(), t.output_path.clone()))
        .collect();

    let launcher = ScriptedLauncher::new(vec![], Behavior::Bake, &journal);
    let report = controller(pool_config(2), launcher, calm(), cache.clone(), tasks)
        .run()
        .await
        .unwrap();

    assert_eq!(report.total, 6);
    assert_eq!(report.succeeded, 6);
    assert_eq!(report.failed, 0);
    assert_eq!(report.requeues, 0);
    assert_eq!(journal.sorted_numbers(), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(journal.launches(), 2);

    for (hash, channel, path) in expected {
        assert_eq!(cache.get(&hash).unwrap().get(&channel), Some(&path));
    }
    // every worker was shut down
    assert_eq!(journal.alive(), 0);
}

#[tokio::test]
async fn test_single_worker_runs_tasks_in_order() {
    let journal = Journal::default();
    let launcher = ScriptedLauncher::new(vec![], Behavior::Bake, &journal);
    let report = controller(pool_config(1), launcher, calm(), CacheStore::shared(), tasks(&["a", "b", "c", "d", "e"]))
        .run()
        .await
        .unwrap();

    assert_eq!(report.succeeded, 5);
    assert_eq!(journal.numbers_of(0), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_initial_workers_bounded_by_task_count() {
    let journal = Journal::default();
    let launcher = ScriptedLauncher::new(vec![], Behavior::Bake, &journal);
    controller(pool_config(4), launcher, calm(), CacheStore::shared(), tasks(&["a", "b"]))
        .run()
        .await
        .unwrap();

    assert_eq!(journal.launches(), 2);
}

#[tokio::test]
async fn test_empty_run_launches_nothing() {
    let journal = Journal::default();
    let launcher = ScriptedLauncher::new(vec![], Behavior::Bake, &journal);
    let report = controller(pool_config(4), launcher, calm(), CacheStore::shared(), Vec::new())
        .run()
        .await
        .unwrap();

    assert_eq!(report.total, 0);
    assert_eq!(journal.launches(), 0);
}

#[tokio::test]
async fn test_crashed_worker_task_is_requeued_once() {
    let journal = Journal::default();
    let launcher = ScriptedLauncher::new(vec![Behavior::ExitOnTask], Behavior::Bake, &journal);
    let report = controller(pool_config(2), launcher, calm(), CacheStore::shared(), tasks(&["a", "b", "c", "d"]))
        .run()
        .await
        .unwrap();

    assert_eq!(report.succeeded, 4);
    assert_eq!(report.requeues, 1);
    assert_eq!(report.relaunches, 0);
    // each task baked exactly once, the crashed worker baked nothing
    assert_eq!(journal.sorted_numbers(), vec![1, 2, 3, 4]);
    assert!(journal.numbers_of(0).is_empty());
}

#[tokio::test]
async fn test_requeued_task_runs_before_fresh_tasks() {
    let journal = Journal::default();
    // the only worker dies on its first task; its replacement must pick
    // the requeued task up before anything fresh
    let launcher = ScriptedLauncher::new(vec![Behavior::ExitOnTask], Behavior::Bake, &journal);
    let report = controller(pool_config(1), launcher, calm(), CacheStore::shared(), tasks(&["a", "b", "c"]))
        .run()
        .await
        .unwrap();

    assert_eq!(report.relaunches, 1);
    assert_eq!(report.requeues, 1);
    assert_eq!(journal.numbers_of(1), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_failed_launches_are_replaced() {
    let journal = Journal::default();
    let launcher = ScriptedLauncher::new(
        vec![Behavior::Unlaunchable, Behavior::Unlaunchable],
        Behavior::Bake,
        &journal,
    );
    let report = controller(pool_config(2), launcher, calm(), CacheStore::shared(), tasks(&["a", "b", "c"]))
        .run()
        .await
        .unwrap();

    assert_eq!(report.succeeded, 3);
    assert_eq!(report.relaunches, 1);
    assert_eq!(journal.numbers_of(2), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_pool_exhausted_when_replacements_keep_dying() {
    let journal = Journal::default();
    let mut config = pool_config(1);
    config.max_relaunches = 2;
    let launcher = ScriptedLauncher::new(vec![], Behavior::ExitOnTask, &journal);

    let err = controller(config, launcher, calm(), CacheStore::shared(), tasks(&["a", "b"]))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::PoolExhausted {
            relaunches: 2,
            remaining: 2
        }
    ));
    assert_eq!(journal.launches(), 3);
}

#[tokio::test]
async fn test_failed_task_aborts_after_all_tasks_finish() {
    let journal = Journal::default();
    let launcher = ScriptedLauncher::new(vec![], Behavior::Bake, &journal);
    let err = controller(pool_config(1), launcher, calm(), CacheStore::shared(), tasks(&["Base Color", "Fail", "Roughness"]))
        .run()
        .await
        .unwrap_err();

    match err {
        ExecutionError::TasksFailed { failed, total, first } => {
            assert_eq!(failed, 1);
            assert_eq!(total, 3);
            assert!(first.contains("Fail"), "{}", first);
        }
        other => panic!("unexpected error: {}", other),
    }
    // the failure did not stop the remaining work
    assert_eq!(journal.sorted_numbers(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_stalled_worker_is_killed_and_task_requeued() {
    let journal = Journal::default();
    let mut config = pool_config(2);
    config.stall_timeout = Duration::from_millis(50);
    let launcher = ScriptedLauncher::new(vec![Behavior::HangOnTask], Behavior::Bake, &journal);

    let report = controller(config, launcher, calm(), CacheStore::shared(), tasks(&["a", "b", "c"]))
        .run()
        .await
        .unwrap();

    assert_eq!(report.stalls, 1);
    assert_eq!(report.requeues, 1);
    assert_eq!(report.succeeded, 3);
    assert_eq!(journal.sorted_numbers(), vec![1, 2, 3]);
    assert_eq!(journal.alive(), 0);
}

#[tokio::test]
async fn test_scale_down_stops_at_floor() {
    let journal = Journal::default();
    let mut config = pool_config(4);
    config.min_workers = Some(2);
    config.sustained_checks = 1;
    let launcher = ScriptedLauncher::new(vec![], Behavior::Slow(Duration::from_millis(20)), &journal);
    let names = channel_names(12);
    let names: Vec<&str> = names.iter().map(String::as_str).collect();

    let mut pool = controller(
        config,
        launcher,
        pressured(CPU_HIGH),
        CacheStore::shared(),
        tasks(&names),
    );
    let min_live = drive_to_finish(&mut pool).await;
    pool.shutdown().await;

    let report = pool.report();
    assert_eq!(report.scale_downs, 2);
    assert_eq!(report.succeeded, 12);
    assert!(min_live >= 2, "live workers dropped to {}", min_live);
    assert_eq!(journal.alive(), 0);
}

#[tokio::test]
async fn test_scale_floor_defaults_to_initial_workers() {
    let journal = Journal::default();
    let mut config = pool_config(3);
    config.sustained_checks = 1;
    let launcher = ScriptedLauncher::new(vec![], Behavior::Slow(Duration::from_millis(5)), &journal);

    let mut pool = controller(
        config,
        launcher,
        pressured(ResourceSample::new(99.0, 99.0)),
        CacheStore::shared(),
        tasks(&["a", "b", "c", "d", "e", "f"]),
    );
    let min_live = drive_to_finish(&mut pool).await;
    pool.shutdown().await;

    assert_eq!(pool.report().scale_downs, 0);
    assert_eq!(min_live, 3);
}

#[tokio::test]
async fn test_scale_down_needs_consecutive_high_samples() {
    let journal = Journal::default();
    let mut config = pool_config(3);
    config.min_workers = Some(1);
    config.sustained_checks = 3;
    let launcher = ScriptedLauncher::new(vec![], Behavior::Slow(Duration::from_millis(5)), &journal);
    // two interrupted streaks of two, then one full streak of three
    let (monitor, remaining) = sequence(
        vec![
            CPU_HIGH, CPU_HIGH, CALM, CPU_HIGH, CPU_HIGH, CALM, CPU_HIGH, CPU_HIGH, CPU_HIGH,
        ],
        CALM,
    );
    let names = channel_names(90);
    let names: Vec<&str> = names.iter().map(String::as_str).collect();

    let mut pool = controller(config, launcher, monitor, CacheStore::shared(), tasks(&names));
    drive_to_finish(&mut pool).await;
    pool.shutdown().await;

    assert!(remaining.lock().unwrap().is_empty(), "run ended before every sample was read");
    let report = pool.report();
    assert_eq!(report.scale_downs, 1);
    assert_eq!(report.succeeded, 90);
    assert_eq!(journal.alive(), 0);
}

#[tokio::test]
async fn test_cpu_pressure_retires_longest_running_task() {
    let journal = Journal::default();
    let mut config = pool_config(2);
    config.min_workers = Some(1);
    config.sustained_checks = 1;
    config.quit_grace = Duration::from_millis(20);
    let launcher = ScriptedLauncher::new(vec![Behavior::HangOnTask], Behavior::Bake, &journal);

    let mut pool = controller(config, launcher, pressured(CPU_HIGH), CacheStore::shared(), tasks(&["a", "b", "c", "d"]));
    drive_to_finish(&mut pool).await;

    assert_eq!(pool.slots()[0].status, SlotStatus::Retired);
    assert_ne!(pool.slots()[1].status, SlotStatus::Retired);
    pool.shutdown().await;

    let report = pool.report();
    assert_eq!(report.scale_downs, 1);
    assert_eq!(report.requeues, 1);
    assert_eq!(report.succeeded, 4);
    assert!(journal.numbers_of(0).is_empty());
    assert_eq!(journal.sorted_numbers(), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_ram_pressure_retires_least_productive_worker() {
    let journal = Journal::default();
    let mut config = pool_config(2);
    config.min_workers = Some(1);
    config.sustained_checks = 1;
    let launcher = ScriptedLauncher::new(
        vec![Behavior::Bake, Behavior::Slow(Duration::from_millis(300))],
        Behavior::Bake,
        &journal,
    );
    // calm long enough for the fast worker to pull ahead
    let (monitor, _) = sequence(vec![CALM; 10], RAM_HIGH);
    let names = channel_names(40);
    let names: Vec<&str> = names.iter().map(String::as_str).collect();

    let mut pool = controller(config, launcher, monitor, CacheStore::shared(), tasks(&names));
    drive_to_finish(&mut pool).await;

    assert_eq!(pool.slots()[1].status, SlotStatus::Retired);
    assert_ne!(pool.slots()[0].status, SlotStatus::Retired);
    assert!(pool.slots()[0].completed > pool.slots()[1].completed);
    pool.shutdown().await;

    let report = pool.report();
    assert_eq!(report.scale_downs, 1);
    assert_eq!(report.succeeded, 40);
}

#[tokio::test]
async fn test_worker_that_never_reports_ready_is_replaced() {
    let journal = Journal::default();
    let mut config = pool_config(1);
    config.ready_timeout = Duration::from_millis(50);
    let launcher = ScriptedLauncher::new(vec![Behavior::NeverReady], Behavior::Bake, &journal);

    let report = controller(config, launcher, calm(), CacheStore::shared(), tasks(&["a", "b"]))
        .run()
        .await
        .unwrap();

    assert_eq!(report.relaunches, 1);
    assert_eq!(report.succeeded, 2);
    assert_eq!(journal.numbers_of(1), vec![1, 2]);
    assert_eq!(journal.alive(), 0);
}

#[tokio::test]
async fn test_silent_workers_exhaust_the_pool() {
    let journal = Journal::default();
    let mut config = pool_config(1);
    config.ready_timeout = Duration::from_millis(20);
    config.max_relaunches = 2;
    let launcher = ScriptedLauncher::new(vec![], Behavior::NeverReady, &journal);

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        controller(config, launcher, calm(), CacheStore::shared(), tasks(&["a"])).run(),
    )
    .await
    .expect("pool kept waiting on workers that never became ready")
    .unwrap_err();

    assert!(matches!(err, ExecutionError::PoolExhausted { relaunches: 2, remaining: 1 }));
    assert_eq!(journal.launches(), 3);
    assert_eq!(journal.alive(), 0);
}

#[tokio::test]
async fn test_cancel_shuts_every_worker_down() {
    let journal = Journal::default();
    let mut config = pool_config(2);
    config.quit_grace = Duration::from_millis(50);
    let launcher = ScriptedLauncher::new(vec![], Behavior::HangOnTask, &journal);
    let pool = controller(config, launcher, calm(), CacheStore::shared(), tasks(&["a", "b", "c", "d"]));
    let cancel = pool.cancel_handle();

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(pool.run(), canceller);

    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(journal.alive(), 0);
}

#[tokio::test]
async fn test_task_without_bundle_is_rejected() {
    let journal = Journal::default();
    let launcher = ScriptedLauncher::new(vec![], Behavior::Bake, &journal);
    let mut unbundled = tasks(&["a"]);
    unbundled[0].bundle_path = None;

    let err = controller(pool_config(1), launcher, calm(), CacheStore::shared(), unbundled)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::NotIsolated(_)));
}
