//! `aires daemon`: runs the daemon in the foreground until it shuts down.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::logging;

pub async fn cmd_daemon(config_path: PathBuf) -> Result<()> {
  let config = aires_core::Config::load(&config_path).with_context(|| format!("failed to load config from {}", config_path.display()))?;

  let _guard = logging::init_daemon_logging(&config.log);

  aires_daemon::Daemon::new(config, config_path).run().await.context("daemon exited with an error")
}
