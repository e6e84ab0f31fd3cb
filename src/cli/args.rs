use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::recorder::DaemonCommand;

#[derive(Parser, Debug)]
#[command(name = "meetrec")]
#[command(about = "Detects meetings and records them with OBS Studio", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: <config dir>/meetrec/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Control API port of the running daemon (default: from config)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the daemon in the foreground (same as no subcommand)
    Run,
    /// Start a manual recording
    Start,
    /// Stop the current recording
    Stop,
    /// Start or stop recording
    Toggle,
    /// Let detection start and stop recordings
    Auto,
    /// Keep detecting, but only act on explicit commands
    Manual,
    /// Keep detecting, never transition
    Pause,
    /// Stop the daemon
    Quit,
    /// Re-read the configuration file
    Reload,
    /// Show daemon status
    Status {
        /// Print the raw JSON snapshot
        #[arg(long)]
        json: bool,
    },
    /// Run one local detection cycle and print every detector's result
    Detect {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show daemon logs
    Logs(LogsCliArgs),
    /// Print the config path and the effective configuration
    Config {
        /// Only print the path
        #[arg(long)]
        path: bool,
    },
    /// Print version information
    Version,
}

impl CliCommand {
    /// The daemon command this subcommand forwards, if any.
    pub fn daemon_command(&self) -> Option<DaemonCommand> {
        match self {
            Self::Start => Some(DaemonCommand::Start),
            Self::Stop => Some(DaemonCommand::Stop),
            Self::Toggle => Some(DaemonCommand::Toggle),
            Self::Auto => Some(DaemonCommand::Auto),
            Self::Manual => Some(DaemonCommand::Manual),
            Self::Pause => Some(DaemonCommand::Pause),
            Self::Quit => Some(DaemonCommand::Quit),
            Self::Reload => Some(DaemonCommand::Reload),
            _ => None,
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct LogsCliArgs {
    /// Number of log entries to show
    #[arg(short = 'n', long, default_value = "50")]
    pub lines: usize,
    /// Only show structured diagnostic entries
    #[arg(long)]
    pub diagnostics: bool,
}
