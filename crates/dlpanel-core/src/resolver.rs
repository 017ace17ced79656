//! Turns job requests into ordered transfer specs.
//!
//! The engine only depends on the [`Resolver`] trait; [`CatalogResolver`]
//! is the implementation backed by a [`Catalog`] and the panel config.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

use crate::catalog::{self, Catalog, ItemSource};
use crate::config::{PanelConfig, TokenInjection};
use crate::error::ValidationError;
use crate::filename;

/// Fully resolved description of one file to fetch and where to place it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSpec {
    pub locator: Url,
    pub dest_dir: PathBuf,
    pub filename: String,
    pub auth_token: Option<String>,
    /// Additional downloader arguments, passed through verbatim.
    pub extra_options: Vec<String>,
    /// Display name used in status messages.
    pub label: String,
}

impl TransferSpec {
    /// Validate the locator and resolve the destination filename.
    pub fn new(
        locator: &str,
        dest_dir: impl Into<PathBuf>,
        requested_name: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let locator = parse_locator(locator)?;
        let filename = filename::resolve(&locator, requested_name)
            .ok_or_else(|| ValidationError::EmptyFilename(locator.to_string()))?;
        Ok(Self {
            label: filename.clone(),
            locator,
            dest_dir: dest_dir.into(),
            filename,
            auth_token: None,
            extra_options: Vec::new(),
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_extra_options(mut self, options: Vec<String>) -> Self {
        self.extra_options = options;
        self
    }

    /// Attach a batch-wide token unless the spec already carries one.
    pub fn with_auth_token(mut self, token: Option<&str>) -> Self {
        if self.auth_token.is_none() {
            self.auth_token = token.filter(|t| !t.is_empty()).map(str::to_string);
        }
        self
    }

    pub fn dest_path(&self) -> PathBuf {
        self.dest_dir.join(&self.filename)
    }

    /// The downloader's resume control file for this destination.
    pub fn control_path(&self, suffix: &str) -> PathBuf {
        self.dest_dir.join(format!("{}{}", self.filename, suffix))
    }

    /// Locator handed to the downloader. In query mode the token replaces any
    /// existing value of the parameter, so it appears exactly once.
    pub fn effective_locator(&self, injection: &TokenInjection) -> Url {
        let (Some(token), TokenInjection::Query { param }) = (&self.auth_token, injection) else {
            return self.locator.clone();
        };
        let mut url = self.locator.clone();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != param.as_str())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(param, token);
        url
    }
}

fn parse_locator(raw: &str) -> Result<Url, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidLocator {
        locator: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// A request from the request layer.
#[derive(Debug, Clone)]
pub enum JobRequest {
    /// One ad-hoc download into a destination category.
    Single {
        locator: String,
        category: String,
        filename: Option<String>,
        auth_token: Option<String>,
        destination_override: Option<PathBuf>,
    },
    /// Several catalog items, downloaded in the given order.
    Batch {
        item_ids: Vec<String>,
        auth_token: Option<String>,
        destination_override: Option<PathBuf>,
    },
    /// Run a tool's setup script.
    InstallTool { tool: String },
}

/// What a worker will execute for a validated request.
#[derive(Debug, Clone)]
pub enum JobPlan {
    Transfers {
        specs: Vec<TransferSpec>,
        auth_token: Option<String>,
    },
    InstallTool {
        tool: String,
        script: PathBuf,
    },
}

/// Trait implemented by request resolvers.
pub trait Resolver: Send + Sync {
    fn resolve(&self, request: &JobRequest) -> Result<JobPlan, ValidationError>;
}

/// Resolver backed by a catalog of downloadable items.
pub struct CatalogResolver {
    config: Arc<PanelConfig>,
    catalog: Arc<dyn Catalog>,
}

impl CatalogResolver {
    pub fn new(config: Arc<PanelConfig>, catalog: Arc<dyn Catalog>) -> Self {
        Self { config, catalog }
    }

    fn resolve_single(
        &self,
        locator: &str,
        category: &str,
        requested_name: Option<&str>,
        destination_override: Option<&Path>,
    ) -> Result<Vec<TransferSpec>, ValidationError> {
        let dest_dir = match destination_override {
            Some(dir) => dir.to_path_buf(),
            None => self
                .config
                .category_dir(category)
                .ok_or_else(|| ValidationError::UnknownCategory(category.to_string()))?,
        };
        Ok(vec![TransferSpec::new(locator, dest_dir, requested_name)?])
    }

    fn resolve_batch(
        &self,
        item_ids: &[String],
        auth_token: Option<&str>,
        destination_override: Option<&Path>,
    ) -> Result<Vec<TransferSpec>, ValidationError> {
        if item_ids.is_empty() {
            return Err(ValidationError::NoItems);
        }
        let mut items = Vec::with_capacity(item_ids.len());
        for id in item_ids {
            let item = self
                .catalog
                .get(id)?
                .ok_or_else(|| ValidationError::UnknownItem(id.clone()))?;
            items.push(item);
        }
        let has_token = auth_token.is_some_and(|t| !t.is_empty());
        if !has_token && items.iter().any(|i| i.requires_token) {
            return Err(ValidationError::TokenRequired);
        }

        let mut specs = Vec::new();
        for item in items {
            let item_specs = match item.source {
                ItemSource::Specs(specs) => specs,
                ItemSource::Script(path) => {
                    let specs = catalog::specs_from_script(&path, &self.config)?;
                    if specs.is_empty() {
                        return Err(ValidationError::EmptyScript(path));
                    }
                    specs
                }
            };
            let count = item_specs.len();
            specs.extend(item_specs.into_iter().enumerate().map(|(i, spec)| {
                let label = if count > 1 {
                    format!("{} ({}/{})", item.name, i + 1, count)
                } else {
                    item.name.clone()
                };
                spec.with_label(label)
            }));
        }
        if let Some(dir) = destination_override {
            for spec in &mut specs {
                spec.dest_dir = dir.to_path_buf();
            }
        }
        Ok(specs)
    }

    fn resolve_tool(&self, tool: &str) -> Result<PathBuf, ValidationError> {
        let script = self.config.tool_scripts_dir().join(format!("{tool}_setup.sh"));
        if tool.is_empty() || tool.contains('/') || !script.is_file() {
            return Err(ValidationError::ToolScriptMissing {
                tool: tool.to_string(),
                path: script,
            });
        }
        Ok(script)
    }
}

impl Resolver for CatalogResolver {
    fn resolve(&self, request: &JobRequest) -> Result<JobPlan, ValidationError> {
        match request {
            JobRequest::Single {
                locator,
                category,
                filename,
                auth_token,
                destination_override,
            } => Ok(JobPlan::Transfers {
                specs: self.resolve_single(
                    locator,
                    category,
                    filename.as_deref(),
                    destination_override.as_deref(),
                )?,
                auth_token: auth_token.clone(),
            }),
            JobRequest::Batch {
                item_ids,
                auth_token,
                destination_override,
            } => Ok(JobPlan::Transfers {
                specs: self.resolve_batch(
                    item_ids,
                    auth_token.as_deref(),
                    destination_override.as_deref(),
                )?,
                auth_token: auth_token.clone(),
            }),
            JobRequest::InstallTool { tool } => Ok(JobPlan::InstallTool {
                tool: tool.clone(),
                script: self.resolve_tool(tool)?,
            }),
        }
    }
}
