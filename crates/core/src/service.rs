/// Point-in-time health of one daemon component, as reported on the
/// status/health control-plane surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
  Ok,
  Degraded,
  Down,
}
