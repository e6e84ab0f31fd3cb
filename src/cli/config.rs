//! `meetrec config`: where the config lives and what it resolves to.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::load_config;
use crate::config::Config;

pub fn handle_config_command(config_path: Option<&Path>, path_only: bool) -> Result<()> {
    let path = resolve_path(config_path)?;
    println!("{}", path.display());
    if path_only {
        return Ok(());
    }

    if !path.exists() {
        println!("(file does not exist yet; showing defaults)");
    }
    let config = load_config(Some(&path))?;
    println!("\n{}", render_effective(&config)?);
    Ok(())
}

/// TOML of the effective config with the OBS password masked.
pub fn render_effective(config: &Config) -> Result<String> {
    let mut shown = config.clone();
    if shown.obs.password.is_some() {
        shown.obs.password = Some("********".to_string());
    }
    toml::to_string_pretty(&shown).context("Failed to serialize config")
}

/// Config path a command will use.
pub fn resolve_path(config_path: Option<&Path>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::config_path(),
    }
}
