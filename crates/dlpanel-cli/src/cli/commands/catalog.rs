//! `dlpanel catalog` – list preset download items.

use anyhow::Result;
use dlpanel_core::catalog::{Catalog, ScriptCatalog};
use std::path::Path;

pub fn run_catalog(dir: &Path) -> Result<()> {
    let items = ScriptCatalog::new(dir).items()?;
    if items.is_empty() {
        println!("No download scripts in {}.", dir.display());
        return Ok(());
    }
    println!("{:<28} {:<6} {}", "ID", "TOKEN", "NAME");
    for item in items {
        let token = if item.requires_token { "yes" } else { "-" };
        println!("{:<28} {:<6} {}", item.id, token, item.name);
        if !item.description.is_empty() {
            println!("{:<28} {:<6} {}", "", "", item.description);
        }
    }
    Ok(())
}
