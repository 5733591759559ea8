//! Config Command
//!
//! Manage Sophia configuration.
//!
//! Usage:
//!   sophia config show [--json]
//!   sophia config path
//!   sophia config init [-g] [--force]

use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::types::Result;

/// Show the merged effective configuration
pub fn show(as_json: bool) -> Result<()> {
    ConfigLoader::show_config(as_json)
}

/// Show configuration paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

/// Write a configuration template
pub fn init(global: bool, force: bool, output: &Output) -> Result<()> {
    let config_path = if global {
        ConfigLoader::init_global(force)?
    } else {
        ConfigLoader::init_project(force)?
    };

    let scope = if global { "global" } else { "project" };
    output.success(&format!("Initialized {} configuration", scope));
    println!("  Config: {}", config_path.display());
    Ok(())
}
