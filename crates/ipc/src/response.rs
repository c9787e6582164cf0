use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aires_core::service::HealthStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResult(pub String);

/// Point-in-time snapshot, per §4.9.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
  pub watcher_running: bool,
  pub uptime_seconds: u64,
  pub files_detected_today: u64,
  /// `FileState::as_str` -> count of files currently in that state.
  pub file_states: HashMap<String, u64>,
  /// `Stage::as_str` -> count of batches currently at that stage.
  pub batches_per_stage: HashMap<String, u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
  pub name: String,
  pub status: HealthStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResult {
  pub status: HealthStatus,
  pub components: Vec<ComponentHealth>,
}

/// Prometheus text exposition; wrapped rather than returned as a bare
/// `String` so the RPC envelope's `result` field stays self-describing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResult {
  pub prometheus_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainResult {
  pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResult {
  pub applied_keys: Vec<String>,
  pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownResult {
  pub message: String,
}
