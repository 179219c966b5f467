//! fbupload entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,fbupload=debug";

#[derive(Parser, Debug)]
#[command(name = "fbupload", version, about = "Resumable uploads to a File Browser server")]
struct Cli {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Queue local files for upload into a remote directory and wait for them
    Upload {
        /// Remote destination directory
        #[arg(long)]
        dest: String,

        /// Local files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Finish batches left over from an earlier run
    Resume,
    /// List remote resources
    Ls {
        #[arg(default_value = "/")]
        paths: Vec<String>,
    },
    /// Print the server-side SHA-256 of a remote file
    Checksum { path: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting fbupload");

    let config = config::Config::load(cli.config.as_deref())?;
    tracing::debug!(host = %config.host, data_dir = %config.data_dir.display(), "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, cli.command))
}
