use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};
use texbake_config::domains::logging::LogLevel;
use uuid::Uuid;

mod cli;
mod commands;

use cli::{Cli, Commands, ConfigCommands};
use commands::{
    cleanup_command, export_command, handle_classify, handle_config_generate,
    handle_config_show, handle_config_validate, handle_hash, load_config, run_worker_process,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = cli.log_level.as_deref().unwrap_or("info");

    // Worker mode first; stdout belongs to the control protocol
    if cli.worker {
        let worker_id = cli
            .worker_id
            .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4().simple()));
        texbake_logging::init_worker_tracing(log_level)?;
        return run_worker_process(worker_id).await;
    }

    let mut config = load_config(cli.config.as_ref())?;
    if let Some(level) = &cli.log_level {
        match level.parse::<LogLevel>() {
            Ok(level) => config.logging.level = level,
            Err(_) => eprintln!("Invalid log level '{}', using configured level", level),
        }
    }
    texbake_logging::init_logging_from_config(&config.logging)?;
    debug!("texbake CLI starting");

    match cli.command {
        Some(Commands::Export {
            scene,
            output,
            objects,
            save_path,
        }) => {
            export_command(
                config,
                &scene,
                &output,
                &objects,
                save_path,
                cli.log_level.as_ref(),
            )
            .await
        }
        Some(Commands::Classify { scene, format }) => handle_classify(&config, &scene, &format),
        Some(Commands::Hash {
            scene,
            object,
            material,
        }) => handle_hash(&config, &scene, &object, &material),
        Some(Commands::Config { config_cmd }) => match config_cmd {
            ConfigCommands::Validate { config_file } => handle_config_validate(&config_file),
            ConfigCommands::Generate { output, force } => handle_config_generate(&output, force),
            ConfigCommands::Show { format } => handle_config_show(&config, &format),
        },
        Some(Commands::Cleanup) => cleanup_command(&config),
        None => {
            info!("No command specified, use --help to see available commands");
            Ok(())
        }
    }
}
