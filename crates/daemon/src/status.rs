//! Status, health, metrics, drain and reload (C10): the read side of the
//! control surface, plus the one piece of runtime-mutable state (the
//! drain flag and the reloadable config fields).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use aires_core::config::{Config, RELOADABLE_KEYS};
use aires_core::domain::Topic;
use aires_core::service::HealthStatus;
use aires_core::{AiresError, Result};
use aires_db::Store;
use aires_ipc::{ComponentHealth, DrainResult, HealthResult, MetricsResult, PingResult, ReloadResult, StatusResult};
use chrono::Utc;
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use tokio::sync::RwLock;

use crate::activity::ActivityTracker;
use crate::concurrency::ConcurrencyGate;

const HEALTH_COMPONENTS: &[&str] = &["watcher", "parser", "docs", "context", "pattern", "synth", "orchestrator"];

pub struct DaemonStatus {
  store: Store,
  activity: Arc<ActivityTracker>,
  gate: Arc<ConcurrencyGate>,
  draining: Arc<AtomicBool>,
  config: RwLock<Config>,
  config_path: PathBuf,
  metrics: Metrics,
}

impl DaemonStatus {
  pub fn new(
    store: Store,
    activity: Arc<ActivityTracker>,
    gate: Arc<ConcurrencyGate>,
    config: Config,
    config_path: PathBuf,
  ) -> Result<Self> {
    Ok(Self {
      store,
      activity,
      gate,
      draining: Arc::new(AtomicBool::new(false)),
      config: RwLock::new(config),
      config_path,
      metrics: Metrics::new()?,
    })
  }

  pub fn draining_flag(&self) -> Arc<AtomicBool> {
    self.draining.clone()
  }

  pub fn is_draining(&self) -> bool {
    self.draining.load(Ordering::Relaxed)
  }

  pub async fn ping(&self) -> Result<PingResult> {
    self.store.ping().await?;
    Ok(PingResult("pong".to_string()))
  }

  pub async fn status(&self) -> Result<StatusResult> {
    let states = self.store.count_by_state().await?;
    let file_states: HashMap<String, u64> = states.iter().map(|(s, c)| (s.as_str().to_string(), *c as u64)).collect();

    let topics = self.store.count_pending_by_topic().await?;
    let batches_per_stage: HashMap<String, u64> = topics
      .iter()
      .filter_map(|(topic, count)| match topic {
        Topic::StageInput(stage) => Some((stage.as_str().to_string(), *count as u64)),
        _ => None,
      })
      .collect();

    Ok(StatusResult {
      watcher_running: !self.is_draining(),
      uptime_seconds: self.activity.uptime_seconds(),
      files_detected_today: self.store.count_detected_today().await?,
      file_states,
      batches_per_stage,
      last_error: self.store.most_recent_error().await?,
    })
  }

  pub async fn health(&self) -> Result<HealthResult> {
    let store_status = if self.store.ping().await.is_ok() { HealthStatus::Ok } else { HealthStatus::Down };
    let window = chrono::Duration::seconds(self.config.read().await.health_window_seconds as i64);

    let mut components = vec![ComponentHealth { name: "store".to_string(), status: store_status, last_activity: None }];
    for name in HEALTH_COMPONENTS {
      let last_activity = self.activity.last_activity(name);
      let status = match last_activity {
        Some(ts) if Utc::now() - ts <= window => HealthStatus::Ok,
        _ => HealthStatus::Degraded,
      };
      components.push(ComponentHealth { name: name.to_string(), status, last_activity });
    }

    let overall = if components.iter().any(|c| c.status == HealthStatus::Down) {
      HealthStatus::Down
    } else if components.iter().any(|c| c.status == HealthStatus::Degraded) {
      HealthStatus::Degraded
    } else {
      HealthStatus::Ok
    };

    Ok(HealthResult { status: overall, components })
  }

  pub async fn metrics(&self) -> Result<MetricsResult> {
    let states = self.store.count_by_state().await?;
    let topics = self.store.count_pending_by_topic().await?;
    self.metrics.refresh(&states, &topics, self.gate.in_flight() as i64);
    Ok(MetricsResult { prometheus_text: self.metrics.render()? })
  }

  /// Tells the watcher to stop admitting new files; batches already in
  /// flight run to completion. There is no corresponding "undrain" — a
  /// drained daemon is meant to be restarted.
  pub fn drain(&self) -> DrainResult {
    self.draining.store(true, Ordering::SeqCst);
    DrainResult { message: "draining: no new files will be claimed, in-flight batches will finish".to_string() }
  }

  /// Re-reads the config file and applies whatever changed among
  /// `RELOADABLE_KEYS`. Everything else requires a restart.
  pub async fn reload(&self) -> Result<ReloadResult> {
    let fresh = Config::load(&self.config_path).map_err(|e| AiresError::Config(e.to_string()))?;
    let mut current = self.config.write().await;
    let mut applied = Vec::new();

    if current.log.level != fresh.log.level {
      current.log.level = fresh.log.level;
      applied.push("log.level".to_string());
    }
    if current.retention_days != fresh.retention_days {
      current.retention_days = fresh.retention_days;
      applied.push("retention_days".to_string());
    }
    for stage in aires_core::domain::Stage::ALL {
      let current_stage = current.stages.get_mut(stage);
      let fresh_stage = fresh.stages.get(stage);
      if current_stage.timeout_seconds != fresh_stage.timeout_seconds {
        current_stage.timeout_seconds = fresh_stage.timeout_seconds;
        applied.push(format!("stages.{}.timeout_seconds", stage.as_str()));
      }
    }

    debug_assert!(applied.iter().all(|key| RELOADABLE_KEYS.contains(&key.as_str())));
    Ok(ReloadResult { message: format!("reloaded {} key(s)", applied.len()), applied_keys: applied })
  }
}

/// Prometheus gauges refreshed on every `/metrics` poll from the state
/// store's own counts, rather than incremented inline by each component.
struct Metrics {
  registry: Registry,
  file_states: IntGaugeVec,
  outbox_backlog: IntGaugeVec,
  batches_in_flight: IntGauge,
}

impl Metrics {
  fn new() -> Result<Self> {
    let registry = Registry::new();
    let file_states = IntGaugeVec::new(Opts::new("aires_file_states", "Files by processing state"), &["state"])
      .map_err(|e| AiresError::Infrastructure(e.to_string()))?;
    let outbox_backlog =
      IntGaugeVec::new(Opts::new("aires_outbox_backlog", "Unpublished outbox rows by topic"), &["topic"])
        .map_err(|e| AiresError::Infrastructure(e.to_string()))?;
    let batches_in_flight = IntGauge::new("aires_batches_in_flight", "Batches currently holding a concurrency permit")
      .map_err(|e| AiresError::Infrastructure(e.to_string()))?;

    registry.register(Box::new(file_states.clone())).map_err(|e| AiresError::Infrastructure(e.to_string()))?;
    registry.register(Box::new(outbox_backlog.clone())).map_err(|e| AiresError::Infrastructure(e.to_string()))?;
    registry.register(Box::new(batches_in_flight.clone())).map_err(|e| AiresError::Infrastructure(e.to_string()))?;

    Ok(Self { registry, file_states, outbox_backlog, batches_in_flight })
  }

  fn refresh(&self, states: &[(aires_core::domain::FileState, i64)], topics: &[(Topic, i64)], in_flight: i64) {
    for (state, count) in states {
      self.file_states.with_label_values(&[state.as_str()]).set(*count);
    }
    for (topic, count) in topics {
      let topic_str = topic.as_str();
      self.outbox_backlog.with_label_values(&[topic_str.as_str()]).set(*count);
    }
    self.batches_in_flight.set(in_flight);
  }

  fn render(&self) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
      .encode(&self.registry.gather(), &mut buffer)
      .map_err(|e| AiresError::Infrastructure(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| AiresError::Infrastructure(e.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn status_reports_file_states() {
    let store = Store::open_in_memory().await.unwrap();
    store.claim_file("build.log".to_string(), "abc".to_string()).await.unwrap();
    let status = DaemonStatus::new(
      store,
      Arc::new(ActivityTracker::new()),
      Arc::new(ConcurrencyGate::new(1)),
      Config::default(),
      PathBuf::from("/dev/null"),
    )
    .unwrap();

    let result = status.status().await.unwrap();
    assert_eq!(result.file_states.get("claimed"), Some(&1));
  }

  #[tokio::test]
  async fn drain_flips_watcher_running_to_false() {
    let store = Store::open_in_memory().await.unwrap();
    let status = DaemonStatus::new(
      store,
      Arc::new(ActivityTracker::new()),
      Arc::new(ConcurrencyGate::new(1)),
      Config::default(),
      PathBuf::from("/dev/null"),
    )
    .unwrap();

    status.drain();
    assert!(!status.status().await.unwrap().watcher_running);
  }
}
