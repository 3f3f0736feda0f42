use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use scigraph_core::ExtractionConfig;

pub fn run(explicit: Option<&Path>) -> Result<()> {
    let (config, source) = ExtractionConfig::discover(explicit).context("failed to load config")?;

    match source {
        Some(path) => eprintln!("{} Config: {}", style("●").green(), path.display()),
        None => eprintln!("{} Config: built-in defaults", style("○").dim()),
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
