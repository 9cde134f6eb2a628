use anyhow::{Context, Result};
use texbake_config::TexbakeConfig;
use texbake_execution::cleanup_orphans;

/// Remove export folders whose owning process has died
pub fn cleanup_command(config: &TexbakeConfig) -> Result<()> {
    let finalize_dir = &config.paths.finalize_dir;
    let removed = cleanup_orphans(finalize_dir)
        .with_context(|| format!("Failed to clean up {:?}", finalize_dir))?;

    for folder in &removed {
        println!("removed {}", folder.display());
    }
    println!("{} orphaned export folder(s) removed", removed.len());
    Ok(())
}
