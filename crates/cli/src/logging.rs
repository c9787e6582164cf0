//! Logging setup shared by every subcommand.

use aires_core::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Console-only logging for the thin client commands (`status`, `drain`, ...).
pub fn init_cli_logging() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
    .without_time()
    .init();
}

/// Logging for `aires daemon`, driven by `log.level`/`log.directory`.
///
/// `log.directory` set means file logging, rotated daily as `aires.log`;
/// unset means console logging. The returned guard must be kept alive for
/// as long as logging is needed.
pub fn init_daemon_logging(log: &LogConfig) -> Option<WorkerGuard> {
  let env_filter = EnvFilter::builder().with_default_directive(log.level.as_tracing_filter().parse().unwrap()).from_env_lossy();

  match &log.directory {
    Some(directory) => {
      if let Err(e) = std::fs::create_dir_all(directory) {
        eprintln!("failed to create log directory {}: {e}, falling back to console", directory.display());
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
      }
      let appender = tracing_appender::rolling::daily(directory, "aires.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt().with_env_filter(env_filter).with_ansi(false).with_writer(writer).init();
      Some(guard)
    }
    None => {
      tracing_subscriber::fmt().with_env_filter(env_filter).init();
      None
    }
  }
}
