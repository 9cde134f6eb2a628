use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use texbake_config::TexbakeConfig;
use texbake_core::Scene;
use texbake_execution::{cleanup_orphans, Exporter, ProcessLauncher, SysinfoMonitor};

use super::manifest::{ManifestFinalizer, SceneFileHost};

/// Bake and export the selected objects of a scene
pub async fn export_command(
    mut config: TexbakeConfig,
    scene_path: &Path,
    output: &Path,
    objects: &[String],
    save_path: Option<PathBuf>,
    log_level: Option<&String>,
) -> Result<()> {
    if save_path.is_some() {
        config.paths.save_path = save_path;
    }
    if let Some(level) = log_level {
        config
            .pool
            .worker_args
            .extend(["--log-level".to_string(), level.clone()]);
    }

    let scene = Scene::from_json_file(scene_path)
        .with_context(|| format!("Failed to load scene from {:?}", scene_path))?;

    match cleanup_orphans(&config.paths.finalize_dir) {
        Ok(removed) if !removed.is_empty() => {
            info!(count = removed.len(), "Removed orphaned export folders")
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Failed to clean up orphaned export folders"),
    }

    let launcher =
        ProcessLauncher::from_config(&config.pool).context("Failed to prepare worker launcher")?;
    let exporter = Exporter::new(config);

    let cancel = exporter.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling export");
            cancel.cancel();
        }
    });

    let mut host = SceneFileHost::new();
    let mut finalizer = ManifestFinalizer::new(output);
    let report = exporter
        .export(
            &scene,
            objects,
            &mut host,
            Box::new(launcher),
            Box::new(SysinfoMonitor::new()),
            &mut finalizer,
        )
        .await
        .context("Export failed")?;

    for skipped in &report.skipped {
        println!(
            "skipped {} / {}: {}",
            skipped.object, skipped.material, skipped.reason
        );
    }
    println!(
        "Exported {} material slots ({} baked, {} requeued, {} failed) in {:.1}s",
        report.assignments,
        report.run.succeeded,
        report.run.requeues,
        report.run.failed,
        report.run.elapsed.as_secs_f64()
    );
    println!("Manifest: {}", report.output.display());
    Ok(())
}
