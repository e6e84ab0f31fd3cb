use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR: &str = "meetrec";

/// Port the daemon's control API listens on unless the config overrides it.
pub const DEFAULT_API_PORT: u16 = 3838;

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .context("Unable to determine config directory")
}

pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Base URL of a locally running daemon's control API.
pub fn api_base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_is_inside_config_dir() {
        if let (Ok(dir), Ok(file)) = (config_dir(), config_file()) {
            assert!(file.starts_with(dir));
            assert!(file.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_api_base_url() {
        assert_eq!(api_base_url(3838), "http://127.0.0.1:3838");
    }
}
