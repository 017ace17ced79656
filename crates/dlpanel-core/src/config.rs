use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How an auth token reaches the downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TokenInjection {
    /// Appended to the locator as `?<param>=<token>`.
    Query { param: String },
    /// Passed as an `Authorization: Bearer` header.
    Header,
}

impl Default for TokenInjection {
    fn default() -> Self {
        TokenInjection::Query {
            param: "token".to_string(),
        }
    }
}

/// External downloader invocation (`[downloader]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Program to execute; also the command prefix recognized in preset scripts.
    pub program: String,
    /// Arguments placed before `-d`/`-o` on every invocation.
    pub base_args: Vec<String>,
    /// Suffix of the downloader's resume control file next to the destination.
    pub control_suffix: String,
    #[serde(default)]
    pub token: TokenInjection,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            program: "aria2c".to_string(),
            base_args: [
                "-x",
                "16",
                "-s",
                "16",
                "--console-log-level=notice",
                "--summary-interval=1",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            control_suffix: ".aria2".to_string(),
            token: TokenInjection::default(),
        }
    }
}

/// Global configuration loaded from `~/.config/dlpanel/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Root under which category directories and relative script destinations live.
    pub models_root: PathBuf,
    /// Directory holding `preset_model_scripts/` and `training_tool_scripts/`.
    pub scripts_dir: PathBuf,
    /// Where single downloads land when no category directory applies.
    pub default_destination: PathBuf,
    /// Grace period between SIGTERM and SIGKILL when stopping, in milliseconds.
    pub stop_grace_ms: u64,
    /// Delay before a stopped job class returns to idle, in milliseconds.
    pub settle_ms: u64,
    /// Number of stderr lines kept for failure diagnostics.
    pub stderr_tail_lines: usize,
    /// Number of raw output lines kept in the status of a tool install.
    pub output_tail_lines: usize,
    /// Destination category -> sub-directory of `models_root`.
    pub categories: BTreeMap<String, String>,
    #[serde(default)]
    pub downloader: DownloaderConfig,
}

impl Default for PanelConfig {
    fn default() -> Self {
        let models_root = PathBuf::from("/workspace/ComfyUI/models");
        let categories = [
            ("lora", "loras"),
            ("checkpoint", "checkpoints"),
            ("diffusion_models", "diffusion_models"),
            ("vae", "vae"),
            ("text_encoders", "text_encoders"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            default_destination: models_root.clone(),
            models_root,
            scripts_dir: PathBuf::from("/scripts"),
            categories,
            stop_grace_ms: 5_000,
            settle_ms: 1_000,
            stderr_tail_lines: 20,
            output_tail_lines: 200,
            downloader: DownloaderConfig::default(),
        }
    }
}

impl PanelConfig {
    /// Directory for a destination category, if the category is known.
    pub fn category_dir(&self, category: &str) -> Option<PathBuf> {
        self.categories
            .get(category)
            .map(|sub| self.models_root.join(sub))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn preset_scripts_dir(&self) -> PathBuf {
        self.scripts_dir.join("preset_model_scripts")
    }

    pub fn tool_scripts_dir(&self) -> PathBuf {
        self.scripts_dir.join("training_tool_scripts")
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dlpanel")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PanelConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = PanelConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit file.
pub fn load_from_path(path: &Path) -> Result<PanelConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: PanelConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = PanelConfig::default();
        assert_eq!(cfg.downloader.program, "aria2c");
        assert_eq!(cfg.downloader.control_suffix, ".aria2");
        assert_eq!(cfg.stop_grace_ms, 5_000);
        assert_eq!(
            cfg.category_dir("lora"),
            Some(PathBuf::from("/workspace/ComfyUI/models/loras"))
        );
        assert!(cfg.category_dir("unknown").is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = PanelConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: PanelConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.models_root, cfg.models_root);
        assert_eq!(parsed.categories, cfg.categories);
        assert_eq!(parsed.downloader.base_args, cfg.downloader.base_args);
        assert_eq!(parsed.downloader.token, cfg.downloader.token);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            models_root = "/data/models"
            scripts_dir = "/data/scripts"
            default_destination = "/data/models"
            stop_grace_ms = 250
            settle_ms = 10
            stderr_tail_lines = 5
            output_tail_lines = 50

            [categories]
            lora = "loras"

            [downloader]
            program = "/usr/local/bin/aria2c"
            base_args = ["-x", "4"]
            control_suffix = ".aria2"
            token = { mode = "header" }
        "#;
        let cfg: PanelConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.stop_grace(), Duration::from_millis(250));
        assert_eq!(cfg.settle_delay(), Duration::from_millis(10));
        assert_eq!(cfg.downloader.token, TokenInjection::Header);
        assert_eq!(
            cfg.category_dir("lora"),
            Some(PathBuf::from("/data/models/loras"))
        );
        assert_eq!(
            cfg.preset_scripts_dir(),
            PathBuf::from("/data/scripts/preset_model_scripts")
        );
    }

    #[test]
    fn missing_downloader_section_uses_defaults() {
        let toml = r#"
            models_root = "/m"
            scripts_dir = "/s"
            default_destination = "/m"
            stop_grace_ms = 1000
            settle_ms = 100
            stderr_tail_lines = 5
            output_tail_lines = 50
            [categories]
        "#;
        let cfg: PanelConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.downloader.program, "aria2c");
        assert_eq!(
            cfg.downloader.token,
            TokenInjection::Query {
                param: "token".into()
            }
        );
    }

    #[test]
    fn load_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = PanelConfig::default();
        fs::write(&path, toml::to_string_pretty(&cfg).unwrap()).unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert_eq!(loaded.scripts_dir, cfg.scripts_dir);
    }
}
