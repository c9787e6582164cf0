//! CLI command implementations.

mod control;
mod daemon;
mod logs;

pub use control::{cmd_drain, cmd_health, cmd_metrics, cmd_ping, cmd_reload, cmd_shutdown, cmd_status};
pub use daemon::cmd_daemon;
pub use logs::cmd_logs;
