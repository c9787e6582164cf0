use serde::{Deserialize, Serialize};

/// The control-plane operations a running daemon answers over its Unix
/// socket, per the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
  Ping,
  Status,
  Health,
  Metrics,
  Drain,
  Reload,
  Shutdown,
}
