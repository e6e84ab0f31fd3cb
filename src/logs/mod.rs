//! Log retrieval and structured diagnostics.
//!
//! Application logs are read back from the systemd user journal; this is
//! used by both the CLI and the control API.

pub mod diagnostics;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::process::Command;

const SERVICE_UNIT: &str = "meetrec.service";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResult {
    /// Application logs from systemd journal
    pub app_logs: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogsOptions {
    /// Number of log entries to retrieve
    pub lines: usize,
    /// Only return structured diagnostic entries
    #[serde(default)]
    pub diagnostics_only: bool,
}

pub fn get_logs(options: &LogsOptions) -> Result<LogsResult> {
    let mut app_logs = get_app_logs(options.lines)?;
    if options.diagnostics_only {
        retain_diagnostics(&mut app_logs);
    }
    Ok(LogsResult { app_logs })
}

/// Get application logs from systemd journal.
///
/// Returns an empty vec if the journal is unavailable.
pub fn get_app_logs(lines: usize) -> Result<Vec<String>> {
    let output = Command::new("journalctl")
        .arg("--user")
        .arg("-u")
        .arg(SERVICE_UNIT)
        .arg("-n")
        .arg(lines.to_string())
        .arg("--output=short-iso")
        .arg("--no-pager")
        .output()
        .context("Failed to execute journalctl. Is the service running?")?;

    if output.status.success() {
        Ok(parse_journal(&String::from_utf8_lossy(&output.stdout)))
    } else {
        Ok(Vec::new())
    }
}

fn retain_diagnostics(lines: &mut Vec<String>) {
    lines.retain(|line| line.contains(diagnostics::DIAG_TARGET));
}

fn parse_journal(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(String::from)
        .collect()
}
