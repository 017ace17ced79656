//! Catalog of selectable download items.
//!
//! The engine consumes items through the [`Catalog`] trait. [`ScriptCatalog`]
//! reads preset download scripts from disk; [`StaticCatalog`] holds items in
//! memory (embedding and tests).

mod header;
mod script;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CatalogError;
use crate::resolver::TransferSpec;

pub use header::{parse_header, ScriptHeader};
pub use script::{extract_commands, spec_from_command, specs_from_script, split_words};

/// Prefix and suffix of preset download scripts: `download_<id>.sh`.
const SCRIPT_PREFIX: &str = "download_";
const SCRIPT_SUFFIX: &str = ".sh";

/// Where an item's transfer specs come from.
#[derive(Debug, Clone)]
pub enum ItemSource {
    Specs(Vec<TransferSpec>),
    /// Shell script whose downloader commands are extracted at resolve time.
    Script(PathBuf),
}

#[derive(Debug, Clone)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub requires_token: bool,
    pub source: ItemSource,
}

pub trait Catalog: Send + Sync {
    /// All items, sorted by display name (case-insensitive).
    fn items(&self) -> Result<Vec<CatalogItem>, CatalogError>;

    fn get(&self, id: &str) -> Result<Option<CatalogItem>, CatalogError> {
        Ok(self.items()?.into_iter().find(|item| item.id == id))
    }
}

fn sort_by_name(items: &mut [CatalogItem]) {
    items.sort_by_key(|item| item.name.to_lowercase());
}

/// In-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    items: Vec<CatalogItem>,
}

impl StaticCatalog {
    pub fn new(mut items: Vec<CatalogItem>) -> Self {
        sort_by_name(&mut items);
        Self { items }
    }
}

impl Catalog for StaticCatalog {
    fn items(&self) -> Result<Vec<CatalogItem>, CatalogError> {
        Ok(self.items.clone())
    }
}

/// Catalog backed by `download_<id>.sh` scripts in a directory.
#[derive(Debug, Clone)]
pub struct ScriptCatalog {
    dir: PathBuf,
}

impl ScriptCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load_item(id: &str, path: &Path) -> Result<CatalogItem, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let header = parse_header(id, &contents);
        Ok(CatalogItem {
            id: id.to_string(),
            name: header.name,
            description: header.description,
            requires_token: header.requires_token,
            source: ItemSource::Script(path.to_path_buf()),
        })
    }
}

impl Catalog for ScriptCatalog {
    fn items(&self) -> Result<Vec<CatalogItem>, CatalogError> {
        if !self.dir.is_dir() {
            return Err(CatalogError::MissingDir(self.dir.clone()));
        }
        let entries = fs::read_dir(&self.dir).map_err(|source| CatalogError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let mut items = Vec::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(id) = file_name
                .to_str()
                .and_then(|n| n.strip_prefix(SCRIPT_PREFIX))
                .and_then(|n| n.strip_suffix(SCRIPT_SUFFIX))
            else {
                continue;
            };
            match Self::load_item(id, &entry.path()) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!("skipping catalog script: {}", e),
            }
        }
        sort_by_name(&mut items);
        Ok(items)
    }

    fn get(&self, id: &str) -> Result<Option<CatalogItem>, CatalogError> {
        if id.is_empty() || id.contains('/') {
            return Ok(None);
        }
        let path = self.dir.join(format!("{SCRIPT_PREFIX}{id}{SCRIPT_SUFFIX}"));
        if !path.is_file() {
            return Ok(None);
        }
        Self::load_item(id, &path).map(Some)
    }
}
