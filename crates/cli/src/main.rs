//! AIRES CLI - run the daemon and talk to its control plane.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod client;
mod commands;
mod logging;

use commands::{cmd_daemon, cmd_drain, cmd_health, cmd_logs, cmd_metrics, cmd_ping, cmd_reload, cmd_shutdown, cmd_status};

#[derive(Parser)]
#[command(name = "aires")]
#[command(about = "AI Error Resolution System: watches a directory for build error logs and writes research booklets")]
struct Cli {
  /// Path to the TOML config file
  #[arg(long, global = true, default_value = "aires.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the daemon in the foreground
  Daemon,
  /// Check whether the daemon is reachable
  Ping,
  /// Show the daemon's current status
  Status {
    #[arg(long)]
    json: bool,
  },
  /// Show per-component health
  Health {
    #[arg(long)]
    json: bool,
  },
  /// Print Prometheus metrics text
  Metrics,
  /// Stop admitting new files; let in-flight batches finish
  Drain,
  /// Reload the reloadable subset of the config file
  Reload,
  /// Shut the daemon down
  Shutdown,
  /// Tail the daemon's log file
  Logs {
    /// Follow the log as it grows
    #[arg(short, long)]
    follow: bool,
    /// Number of lines to show from the end
    #[arg(short = 'n', long, default_value = "50")]
    lines: usize,
    /// Log file date, YYYY-MM-DD (default: today)
    #[arg(long)]
    date: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  match &cli.command {
    Commands::Daemon => {} // daemon command initializes its own logging from config
    _ => logging::init_cli_logging(),
  }

  match cli.command {
    Commands::Daemon => cmd_daemon(cli.config).await,
    Commands::Ping => cmd_ping(socket_path(&cli.config).await?).await,
    Commands::Status { json } => cmd_status(socket_path(&cli.config).await?, json).await,
    Commands::Health { json } => cmd_health(socket_path(&cli.config).await?, json).await,
    Commands::Metrics => cmd_metrics(socket_path(&cli.config).await?).await,
    Commands::Drain => cmd_drain(socket_path(&cli.config).await?).await,
    Commands::Reload => cmd_reload(socket_path(&cli.config).await?).await,
    Commands::Shutdown => cmd_shutdown(socket_path(&cli.config).await?).await,
    Commands::Logs { follow, lines, date } => cmd_logs(cli.config, follow, lines, date).await,
  }
}

/// Control-plane commands need only the socket path, not the full config,
/// but the socket path itself is a config value.
async fn socket_path(config_path: &PathBuf) -> Result<PathBuf> {
  let config = aires_core::Config::load(config_path)?;
  Ok(config.control_socket_path)
}
