//! Worker pool and scheduler configuration

use crate::error::ConfigResult;
use crate::validation::{validate_percentage, validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Workers launched at the start of an export
    #[serde(default = "default_initial_workers")]
    pub initial_workers: usize,

    /// Scale-down never goes below this many running workers.
    /// Defaults to `initial_workers` when unset.
    #[serde(default)]
    pub min_workers: Option<usize>,

    /// Upper bound on concurrently running workers
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Completed tasks after which the pool leaves its ramp-up phase
    #[serde(default = "default_stabilize_tasks")]
    pub stabilize_tasks: usize,

    /// CPU usage considered critical
    #[serde(default = "default_high_percent")]
    pub high_cpu_percent: f32,

    /// RAM usage considered critical
    #[serde(default = "default_high_percent")]
    pub high_ram_percent: f32,

    /// Consecutive critical samples before a worker is retired
    #[serde(default = "default_sustained_checks")]
    pub sustained_checks: u32,

    /// Scheduler tick interval
    #[serde(
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_check_interval"
    )]
    pub check_interval: Duration,

    /// A task running longer than this is treated as a crashed worker
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_stall_timeout"
    )]
    pub stall_timeout: Duration,

    /// A launched worker that has not reported ready within this time is
    /// killed and counted as a failed launch
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_ready_timeout"
    )]
    pub ready_timeout: Duration,

    /// Time a worker gets to exit after a quit message
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_quit_grace"
    )]
    pub quit_grace: Duration,

    /// Time a worker gets to exit after SIGTERM before it is killed
    #[serde(
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_terminate_wait"
    )]
    pub terminate_wait: Duration,

    /// Timeout for writing one message to a worker's stdin
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_write_timeout"
    )]
    pub write_timeout: Duration,

    /// Timeout for joining a worker's output reader tasks
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_reader_join_timeout"
    )]
    pub reader_join_timeout: Duration,

    /// Replacement workers launched when every worker has died
    #[serde(default = "default_max_relaunches")]
    pub max_relaunches: u32,

    /// Worker executable; the current executable when unset
    #[serde(default)]
    pub worker_program: Option<PathBuf>,

    /// Extra arguments passed to every worker before `--worker`
    #[serde(default)]
    pub worker_args: Vec<String>,
}

impl PoolConfig {
    /// Running-worker floor for resource scale-down
    pub fn scale_floor(&self) -> usize {
        self.min_workers.unwrap_or(self.initial_workers).max(1)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_workers: default_initial_workers(),
            min_workers: None,
            max_workers: default_max_workers(),
            stabilize_tasks: default_stabilize_tasks(),
            high_cpu_percent: default_high_percent(),
            high_ram_percent: default_high_percent(),
            sustained_checks: default_sustained_checks(),
            check_interval: default_check_interval(),
            stall_timeout: default_stall_timeout(),
            ready_timeout: default_ready_timeout(),
            quit_grace: default_quit_grace(),
            terminate_wait: default_terminate_wait(),
            write_timeout: default_write_timeout(),
            reader_join_timeout: default_reader_join_timeout(),
            max_relaunches: default_max_relaunches(),
            worker_program: None,
            worker_args: Vec::new(),
        }
    }
}

impl Validatable for PoolConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.initial_workers, "initial_workers", self.domain_name())?;
        validate_positive(self.max_workers, "max_workers", self.domain_name())?;
        validate_positive(self.sustained_checks, "sustained_checks", self.domain_name())?;
        validate_percentage(self.high_cpu_percent, "high_cpu_percent", self.domain_name())?;
        validate_percentage(self.high_ram_percent, "high_ram_percent", self.domain_name())?;
        validate_positive(
            self.check_interval.as_millis(),
            "check_interval",
            self.domain_name(),
        )?;
        validate_positive(
            self.stall_timeout.as_secs(),
            "stall_timeout",
            self.domain_name(),
        )?;
        validate_positive(
            self.ready_timeout.as_millis(),
            "ready_timeout",
            self.domain_name(),
        )?;

        if let Some(min) = self.min_workers {
            validate_positive(min, "min_workers", self.domain_name())?;
            if min > self.initial_workers {
                return Err(self.validation_error(format!(
                    "min_workers ({}) cannot exceed initial_workers ({})",
                    min, self.initial_workers
                )));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "pool"
    }
}

fn default_initial_workers() -> usize {
    4
}

fn default_max_workers() -> usize {
    num_cpus::get()
}

fn default_stabilize_tasks() -> usize {
    4
}

fn default_high_percent() -> f32 {
    95.0
}

fn default_sustained_checks() -> u32 {
    3
}

fn default_check_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_stall_timeout() -> Duration {
    Duration::from_secs(300) // 5 minutes
}

fn default_ready_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_quit_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_terminate_wait() -> Duration {
    Duration::from_millis(500)
}

fn default_write_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_reader_join_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_max_relaunches() -> u32 {
    3
}
