//! `dlpanel fetch`, `dlpanel batch`, `dlpanel install-tool` – start a job and follow it.

use anyhow::Result;
use dlpanel_core::catalog::ScriptCatalog;
use dlpanel_core::config::PanelConfig;
use dlpanel_core::{Engine, JobKind, JobRequest};
use std::path::PathBuf;
use std::sync::Arc;

use super::follow::follow_job;

pub async fn run_fetch(
    cfg: PanelConfig,
    url: String,
    category: String,
    filename: Option<String>,
    token: Option<String>,
    dest: Option<PathBuf>,
) -> Result<()> {
    let catalog = Arc::new(ScriptCatalog::new(cfg.preset_scripts_dir()));
    let engine = Arc::new(Engine::with_catalog(cfg, catalog));
    let request = JobRequest::Single {
        locator: url,
        category,
        filename,
        auth_token: token,
        destination_override: dest,
    };
    follow_job(engine, JobKind::Single, request).await
}

pub async fn run_batch(
    cfg: PanelConfig,
    items: Vec<String>,
    token: Option<String>,
    dest: Option<PathBuf>,
    catalog_dir: Option<PathBuf>,
) -> Result<()> {
    let dir = catalog_dir.unwrap_or_else(|| cfg.preset_scripts_dir());
    let engine = Arc::new(Engine::with_catalog(cfg, Arc::new(ScriptCatalog::new(dir))));
    let request = JobRequest::Batch {
        item_ids: items,
        auth_token: token,
        destination_override: dest,
    };
    follow_job(engine, JobKind::Batch, request).await
}

pub async fn run_install_tool(cfg: PanelConfig, tool: String) -> Result<()> {
    let catalog = Arc::new(ScriptCatalog::new(cfg.preset_scripts_dir()));
    let engine = Arc::new(Engine::with_catalog(cfg, catalog));
    follow_job(engine, JobKind::Tool, JobRequest::InstallTool { tool }).await
}
