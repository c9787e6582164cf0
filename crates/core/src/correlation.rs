use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A per-batch identifier stamped on every log line, metric, and message
/// produced while that batch is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
  pub fn new() -> Self {
    Self(Uuid::now_v7())
  }

  pub fn from_uuid(id: Uuid) -> Self {
    Self(id)
  }

  pub fn as_uuid(&self) -> Uuid {
    self.0
  }

  /// First 8 hex characters, used as the booklet filename collision suffix.
  pub fn short(&self) -> String {
    self.0.simple().to_string()[..8].to_string()
  }
}

impl Default for CorrelationId {
  fn default() -> Self {
    Self::new()
  }
}

impl std::fmt::Display for CorrelationId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}
