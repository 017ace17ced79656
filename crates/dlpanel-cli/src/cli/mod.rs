//! CLI for the dlpanel download-job engine.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dlpanel_core::config;
use dlpanel_core::JobKind;
use std::path::PathBuf;

use commands::{
    run_batch, run_catalog, run_fetch, run_install_tool, run_parse_progress, run_status, run_stop,
};

/// Top-level CLI for dlpanel.
#[derive(Debug, Parser)]
#[command(name = "dlpanel")]
#[command(about = "dlpanel: model download jobs driven by aria2c", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// List the preset download items.
    Catalog {
        /// Directory of download_<id>.sh scripts (default: <scripts_dir>/preset_model_scripts).
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Download one file into a destination category and follow its progress.
    Fetch {
        /// Direct HTTP/HTTPS URL to download.
        url: String,
        /// Destination category (e.g. lora, checkpoint, vae).
        #[arg(long, short = 'c', default_value = "lora")]
        category: String,
        /// Output filename; the URL's extension is added when missing.
        #[arg(long, short = 'o')]
        filename: Option<String>,
        /// Auth token passed to the download host.
        #[arg(long, env = "DLPANEL_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Download into this directory instead of the category's.
        #[arg(long, value_name = "DIR")]
        dest: Option<PathBuf>,
    },

    /// Download catalog items in order and follow their progress.
    Batch {
        /// Catalog item ids, in download order.
        #[arg(required = true)]
        items: Vec<String>,
        /// Auth token for gated items.
        #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Download every file into this directory.
        #[arg(long, value_name = "DIR")]
        dest: Option<PathBuf>,
        /// Directory of download_<id>.sh scripts.
        #[arg(long, value_name = "DIR")]
        catalog_dir: Option<PathBuf>,
    },

    /// Run a tool's setup script.
    InstallTool {
        /// Tool name; runs <scripts_dir>/training_tool_scripts/<tool>_setup.sh.
        tool: String,
    },

    /// Stop the job of a class running in another dlpanel process.
    Stop {
        /// Job class: single, batch or tool.
        class: JobKind,
    },

    /// Show the status of a job class running in another dlpanel process.
    Status {
        /// Job class: single, batch or tool.
        class: JobKind,
    },

    /// Classify downloader output lines (arguments, or stdin when none are given).
    ParseProgress {
        lines: Vec<String>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Catalog { dir } => {
                run_catalog(&dir.unwrap_or_else(|| cfg.preset_scripts_dir()))?
            }
            CliCommand::Fetch {
                url,
                category,
                filename,
                token,
                dest,
            } => run_fetch(cfg, url, category, filename, token, dest).await?,
            CliCommand::Batch {
                items,
                token,
                dest,
                catalog_dir,
            } => run_batch(cfg, items, token, dest, catalog_dir).await?,
            CliCommand::InstallTool { tool } => run_install_tool(cfg, tool).await?,
            CliCommand::Stop { class } => run_stop(class).await?,
            CliCommand::Status { class } => run_status(class).await?,
            CliCommand::ParseProgress { lines } => run_parse_progress(&lines)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
