use anyhow::Result;
use clap::Parser;
use meetrec::{
    app,
    cli::{
        api_port, handle_config_command, handle_daemon_command, handle_detect_command,
        handle_logs_command, handle_status_command, Cli, CliCommand,
    },
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config_path = cli.config.as_deref();
    match &cli.command {
        None | Some(CliCommand::Run) => {}
        Some(CliCommand::Version) => {
            println!("meetrec {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Status { json }) => {
            let port = api_port(config_path, cli.port)?;
            return handle_status_command(port, *json).await;
        }
        Some(CliCommand::Detect { json }) => {
            return handle_detect_command(config_path, *json);
        }
        Some(CliCommand::Logs(args)) => {
            return handle_logs_command(args.clone());
        }
        Some(CliCommand::Config { path }) => {
            return handle_config_command(config_path, *path);
        }
        Some(command) => {
            if let Some(daemon_command) = command.daemon_command() {
                let port = api_port(config_path, cli.port)?;
                return handle_daemon_command(port, daemon_command).await;
            }
        }
    }

    app::run_service(cli.config).await
}
