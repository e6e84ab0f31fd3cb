//! CLI handler for viewing logs.
//!
//! This module handles terminal presentation.
//! Core logic is delegated to the `logs` module.

use crate::logs::{self, LogsOptions};
use anyhow::Result;

use super::args::LogsCliArgs;

pub fn handle_logs_command(args: LogsCliArgs) -> Result<()> {
    let options = LogsOptions {
        lines: args.lines,
        diagnostics_only: args.diagnostics,
    };
    let result = logs::get_logs(&options)?;

    let heading = if args.diagnostics { "Diagnostics" } else { "Application Logs" };
    println!("=== {} (last {} entries) ===\n", heading, args.lines);

    if result.app_logs.is_empty() {
        println!("No logs found. Is meetrec running as a systemd user service?");
    } else {
        for line in &result.app_logs {
            println!("{}", line);
        }
    }

    Ok(())
}
