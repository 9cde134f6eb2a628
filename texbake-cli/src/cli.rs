//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "texbake", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Run as worker process (internal use)
    #[arg(long, hide = true)]
    pub worker: bool,

    /// Worker ID (used with --worker)
    #[arg(long, value_name = "ID", hide = true)]
    pub worker_id: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bake and export the materials of a scene
    Export {
        /// Scene description (JSON)
        #[arg(long, value_name = "PATH")]
        scene: PathBuf,

        /// Directory receiving the export manifest
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Objects to export; every exportable object when omitted
        #[arg(long, value_name = "NAME", num_args = 1..)]
        objects: Vec<String>,

        /// Project save path, overriding the configured one
        #[arg(long, value_name = "PATH")]
        save_path: Option<PathBuf>,
    },

    /// Print the bake strategy of every material in a scene
    Classify {
        /// Scene description (JSON)
        #[arg(long, value_name = "PATH")]
        scene: PathBuf,

        /// Output format: text, json
        #[arg(long, value_name = "FORMAT", default_value = "text")]
        format: String,
    },

    /// Print the content hash of a material as baked onto an object
    Hash {
        /// Scene description (JSON)
        #[arg(long, value_name = "PATH")]
        scene: PathBuf,

        /// Object carrying the material
        #[arg(long, value_name = "NAME")]
        object: String,

        /// Material name
        #[arg(long, value_name = "NAME")]
        material: String,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },

    /// Remove export folders left behind by dead processes
    Cleanup,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration in use
    Show {
        /// Output format: yaml, json
        #[arg(long, value_name = "FORMAT", default_value = "yaml")]
        format: String,
    },
}
