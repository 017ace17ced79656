//! Error types surfaced by the engine.
//!
//! Only [`ValidationError`] ever reaches the caller of `start`; everything
//! that goes wrong inside a worker is folded into a terminal `JobStatus`.

use std::path::PathBuf;

/// A job request that cannot be turned into transfer specs.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("no items selected")]
    NoItems,
    #[error("unknown catalog item: {0}")]
    UnknownItem(String),
    #[error("an auth token is required for one or more selected items")]
    TokenRequired,
    #[error("invalid locator {locator:?}: {reason}")]
    InvalidLocator { locator: String, reason: String },
    #[error("unknown destination category: {0}")]
    UnknownCategory(String),
    #[error("could not derive a filename for {0}")]
    EmptyFilename(String),
    #[error("no downloader commands found in {}", .0.display())]
    EmptyScript(PathBuf),
    #[error("setup script not found for {tool} at {}", .path.display())]
    ToolScriptMissing { tool: String, path: PathBuf },
    #[error("request does not belong to the {0} job class")]
    WrongClass(&'static str),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// The external process could not be created.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("create destination directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure reading catalog metadata.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("scripts directory not found at {}", .0.display())]
    MissingDir(PathBuf),
    #[error("read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
