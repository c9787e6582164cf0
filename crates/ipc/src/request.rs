use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PingParams;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatusParams;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HealthParams;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsParams;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DrainParams;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReloadParams;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShutdownParams;
