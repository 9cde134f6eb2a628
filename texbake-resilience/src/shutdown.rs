//! Escalating shutdown of external processes
//!
//! A process is first asked to exit through its own protocol, then sent
//! SIGTERM, then killed. Each tier has a bounded wait so the total shutdown
//! latency of a process never exceeds the sum of the configured timeouts
//! plus the final reap.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// Upper bound for reaping a process after SIGKILL
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while shutting a process down
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Waiting on or signalling the process failed
    #[error("Process error: {0}")]
    ProcessError(String),

    /// The process survived a kill
    #[error("Process {0} unresponsive to termination")]
    Unresponsive(u32),
}

impl From<std::io::Error> for ShutdownError {
    fn from(err: std::io::Error) -> Self {
        ShutdownError::ProcessError(err.to_string())
    }
}

/// Which escalation tier ended the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownTier {
    /// Already gone before anything was sent
    AlreadyExited,
    /// Exited on its own after the quit request
    Graceful,
    /// Exited after SIGTERM
    Terminated,
    /// Force-killed
    Killed,
}

impl fmt::Display for ShutdownTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownTier::AlreadyExited => write!(f, "already exited"),
            ShutdownTier::Graceful => write!(f, "graceful"),
            ShutdownTier::Terminated => write!(f, "terminated"),
            ShutdownTier::Killed => write!(f, "killed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownOutcome {
    pub tier: ShutdownTier,
    pub status: Option<ExitStatus>,
}

/// Waits of the three escalation tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationTimeouts {
    /// Wait after the quit request
    pub quit_grace: Duration,
    /// Wait after SIGTERM
    pub terminate_wait: Duration,
}

impl Default for EscalationTimeouts {
    fn default() -> Self {
        Self {
            quit_grace: Duration::from_secs(5),
            terminate_wait: Duration::from_millis(500),
        }
    }
}

/// A process that can be asked to exit before being signalled
#[async_trait]
pub trait GracefulProcess: Send {
    /// OS process id, `None` once reaped
    fn pid(&self) -> Option<u32>;

    /// Non-blocking exit check
    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>>;

    /// Protocol-level exit request, e.g. a quit message followed by
    /// closing the input stream. Failures are logged and escalated past.
    async fn request_exit(&mut self) -> std::io::Result<()>;

    /// Wait for the process to exit
    async fn wait(&mut self) -> std::io::Result<ExitStatus>;

    /// Force-kill without waiting
    fn start_kill(&mut self) -> std::io::Result<()>;
}

/// Process shutdown manager for external processes
pub struct ProcessShutdownManager;

impl ProcessShutdownManager {
    /// Shut a process down with the three-tier escalation
    pub async fn shutdown_process<P>(
        process: &mut P,
        timeouts: EscalationTimeouts,
    ) -> Result<ShutdownOutcome, ShutdownError>
    where
        P: GracefulProcess + ?Sized,
    {
        let pid = process.pid().unwrap_or_default();

        if let Ok(Some(status)) = process.try_wait() {
            debug!("Process {} already exited with {}", pid, status);
            return Ok(ShutdownOutcome {
                tier: ShutdownTier::AlreadyExited,
                status: Some(status),
            });
        }

        // Tier 1: ask politely
        info!("Requesting exit of process {}", pid);
        if let Err(e) = process.request_exit().await {
            warn!("Exit request to process {} failed: {}", pid, e);
        }
        if let Some(status) = Self::wait_bounded(process, timeouts.quit_grace, pid).await {
            info!("Process {} exited gracefully with {}", pid, status);
            return Ok(ShutdownOutcome {
                tier: ShutdownTier::Graceful,
                status: Some(status),
            });
        }

        // Tier 2: SIGTERM
        warn!(
            "Process {} did not exit within {:?}, sending terminate signal",
            pid, timeouts.quit_grace
        );
        Self::send_terminate(pid);
        if let Some(status) = Self::wait_bounded(process, timeouts.terminate_wait, pid).await {
            info!("Process {} terminated with {}", pid, status);
            return Ok(ShutdownOutcome {
                tier: ShutdownTier::Terminated,
                status: Some(status),
            });
        }

        // Tier 3: kill
        warn!("Forcing process {} termination", pid);
        if let Err(e) = process.start_kill() {
            // The process may have exited between the wait and the kill
            if let Ok(Some(status)) = process.try_wait() {
                return Ok(ShutdownOutcome {
                    tier: ShutdownTier::Terminated,
                    status: Some(status),
                });
            }
            error!("Failed to kill process {}: {}", pid, e);
            return Err(e.into());
        }

        match timeout(REAP_TIMEOUT, process.wait()).await {
            Ok(Ok(status)) => {
                info!("Process {} killed with {}", pid, status);
                Ok(ShutdownOutcome {
                    tier: ShutdownTier::Killed,
                    status: Some(status),
                })
            }
            Ok(Err(e)) => {
                error!("Error waiting for killed process {}: {}", pid, e);
                Err(e.into())
            }
            Err(_) => {
                error!("Process {} did not terminate even after force kill", pid);
                Err(ShutdownError::Unresponsive(pid))
            }
        }
    }

    /// Shut down several processes in parallel
    pub async fn shutdown_processes<P>(
        processes: Vec<&mut P>,
        timeouts: EscalationTimeouts,
    ) -> Vec<Result<ShutdownOutcome, ShutdownError>>
    where
        P: GracefulProcess + ?Sized,
    {
        let futures = processes
            .into_iter()
            .map(|process| Self::shutdown_process(process, timeouts));

        futures::future::join_all(futures).await
    }

    async fn wait_bounded<P>(process: &mut P, limit: Duration, pid: u32) -> Option<ExitStatus>
    where
        P: GracefulProcess + ?Sized,
    {
        match timeout(limit, process.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                error!("Error waiting for process {}: {}", pid, e);
                None
            }
            Err(_) => None,
        }
    }

    fn send_terminate(pid: u32) {
        #[cfg(all(unix, feature = "shutdown"))]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            if pid == 0 {
                return;
            }
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!("Failed to send SIGTERM to process {}: {}", pid, e);
            }
        }

        #[cfg(not(all(unix, feature = "shutdown")))]
        {
            debug!("No terminate signal on this platform for process {}, escalating to kill", pid);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::io::AsyncWriteExt;
    use tokio::process::{Child, ChildStdin, Command};

    struct ShellProcess {
        child: Child,
        stdin: Option<ChildStdin>,
    }

    impl ShellProcess {
        fn spawn(script: &str) -> Self {
            let mut child = Command::new("sh")
                .arg("-c")
                .arg(script)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .unwrap();
            let stdin = child.stdin.take();
            Self { child, stdin }
        }
    }

    #[async_trait]
    impl GracefulProcess for ShellProcess {
        fn pid(&self) -> Option<u32> {
            self.child.id()
        }

        fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
            self.child.try_wait()
        }

        async fn request_exit(&mut self) -> std::io::Result<()> {
            if let Some(mut stdin) = self.stdin.take() {
                stdin.write_all(b"{\"action\":\"quit\"}\n").await?;
                stdin.shutdown().await?;
            }
            Ok(())
        }

        async fn wait(&mut self) -> std::io::Result<ExitStatus> {
            self.child.wait().await
        }

        fn start_kill(&mut self) -> std::io::Result<()> {
            self.child.start_kill()
        }
    }

    fn fast() -> EscalationTimeouts {
        EscalationTimeouts {
            quit_grace: Duration::from_millis(500),
            terminate_wait: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_cooperative_process_exits_gracefully() {
        // reads until stdin closes
        let mut process = ShellProcess::spawn("cat > /dev/null");
        let outcome = ProcessShutdownManager::shutdown_process(&mut process, fast())
            .await
            .unwrap();
        assert_eq!(outcome.tier, ShutdownTier::Graceful);
    }

    #[tokio::test]
    async fn test_deaf_process_is_terminated() {
        let mut process = ShellProcess::spawn("exec sleep 30");
        let outcome = ProcessShutdownManager::shutdown_process(&mut process, fast())
            .await
            .unwrap();
        assert_eq!(outcome.tier, ShutdownTier::Terminated);
    }

    #[tokio::test]
    async fn test_term_ignoring_process_is_killed() {
        let mut process = ShellProcess::spawn("trap '' TERM; while true; do sleep 1; done");
        let outcome = ProcessShutdownManager::shutdown_process(&mut process, fast())
            .await
            .unwrap();
        assert_eq!(outcome.tier, ShutdownTier::Killed);
    }

    #[tokio::test]
    async fn test_exited_process_needs_nothing() {
        let mut process = ShellProcess::spawn("exit 0");
        let _ = process.child.wait().await;
        let outcome = ProcessShutdownManager::shutdown_process(&mut process, fast())
            .await
            .unwrap();
        assert_eq!(outcome.tier, ShutdownTier::AlreadyExited);
    }

    #[tokio::test]
    async fn test_parallel_shutdown() {
        let mut a = ShellProcess::spawn("cat > /dev/null");
        let mut b = ShellProcess::spawn("exec sleep 30");
        let results =
            ProcessShutdownManager::shutdown_processes(vec![&mut a, &mut b], fast()).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
    }
}
