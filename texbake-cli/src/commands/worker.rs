use anyhow::{Context, Result};
use texbake_bake::{run_worker, FlatBakeBackend};
use texbake_ipc::StdioTransport;
use tracing::info;

/// Run as worker process
pub async fn run_worker_process(worker_id: String) -> Result<()> {
    let stats = run_worker(worker_id, StdioTransport::stdio(), FlatBakeBackend)
        .await
        .context("Worker loop failed")?;

    info!(
        worker = %stats.worker_id,
        executed = stats.tasks_executed,
        failed = stats.tasks_failed,
        uptime_secs = (chrono::Utc::now() - stats.started_at).num_seconds(),
        "Worker shutting down"
    );
    Ok(())
}
