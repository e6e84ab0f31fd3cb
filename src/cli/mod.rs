pub mod args;
pub mod config;
pub mod daemon;
pub mod detect;
pub mod logs;

use anyhow::Result;
use std::path::Path;

use crate::config::Config;

pub use args::{Cli, CliCommand, LogsCliArgs};
pub use config::handle_config_command;
pub use daemon::{handle_daemon_command, handle_status_command, DaemonClient};
pub use detect::handle_detect_command;
pub use logs::handle_logs_command;

/// Config for a client-side command. Unlike the daemon, a missing file
/// falls back to defaults and nothing is written to disk.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = config::resolve_path(path)?;
    if path.exists() {
        Config::load_from(&path)
    } else {
        Ok(Config::default())
    }
}

/// Control API port: `--port` wins, then the config file, then the default.
pub fn api_port(config_path: Option<&Path>, port_override: Option<u16>) -> Result<u16> {
    match port_override {
        Some(port) => Ok(port),
        None => Ok(load_config(config_path)?.api.port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::DEFAULT_API_PORT;

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.api.port, DEFAULT_API_PORT);
        assert!(!path.exists());
    }

    #[test]
    fn test_api_port_prefers_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.api.port = 4000;
        config.save_to(&path).unwrap();

        assert_eq!(api_port(Some(&path), Some(5000)).unwrap(), 5000);
        assert_eq!(api_port(Some(&path), None).unwrap(), 4000);
    }
}
