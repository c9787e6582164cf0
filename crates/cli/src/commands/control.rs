//! Thin control-plane commands: each opens a connection, sends one request,
//! prints the result, and exits. No retry, no polling — the daemon is
//! expected to already be running.

use std::path::PathBuf;

use aires_ipc::{DrainResult, HealthResult, Method, MetricsResult, PingResult, ReloadResult, ShutdownResult, StatusResult};
use anyhow::Result;

use crate::client::Client;

pub async fn cmd_ping(socket_path: PathBuf) -> Result<()> {
  let result: PingResult = Client::new(socket_path).call(Method::Ping).await?;
  println!("{}", result.0);
  Ok(())
}

pub async fn cmd_status(socket_path: PathBuf, json: bool) -> Result<()> {
  let result: StatusResult = Client::new(socket_path).call(Method::Status).await?;
  if json {
    println!("{}", serde_json::to_string_pretty(&result)?);
    return Ok(());
  }

  println!("watcher:  {}", if result.watcher_running { "running" } else { "draining" });
  println!("uptime:   {}s", result.uptime_seconds);
  println!("detected today: {}", result.files_detected_today);
  println!("file states:");
  let mut states: Vec<_> = result.file_states.iter().collect();
  states.sort_by_key(|(state, _)| state.to_string());
  for (state, count) in states {
    println!("  {state:<12} {count}");
  }
  println!("batches per stage:");
  let mut stages: Vec<_> = result.batches_per_stage.iter().collect();
  stages.sort_by_key(|(stage, _)| stage.to_string());
  for (stage, count) in stages {
    println!("  {stage:<12} {count}");
  }
  if let Some(last_error) = result.last_error {
    println!("last error: {last_error}");
  }
  Ok(())
}

pub async fn cmd_health(socket_path: PathBuf, json: bool) -> Result<()> {
  let result: HealthResult = Client::new(socket_path).call(Method::Health).await?;
  if json {
    println!("{}", serde_json::to_string_pretty(&result)?);
    return Ok(());
  }

  println!("overall: {:?}", result.status);
  for component in result.components {
    let activity = component.last_activity.map(|ts| ts.to_rfc3339()).unwrap_or_else(|| "never".to_string());
    println!("  {:<12} {:?} (last activity: {activity})", component.name, component.status);
  }
  Ok(())
}

pub async fn cmd_metrics(socket_path: PathBuf) -> Result<()> {
  let result: MetricsResult = Client::new(socket_path).call(Method::Metrics).await?;
  print!("{}", result.prometheus_text);
  Ok(())
}

pub async fn cmd_drain(socket_path: PathBuf) -> Result<()> {
  let result: DrainResult = Client::new(socket_path).call(Method::Drain).await?;
  println!("{}", result.message);
  Ok(())
}

pub async fn cmd_reload(socket_path: PathBuf) -> Result<()> {
  let result: ReloadResult = Client::new(socket_path).call(Method::Reload).await?;
  println!("{}", result.message);
  for key in result.applied_keys {
    println!("  {key}");
  }
  Ok(())
}

pub async fn cmd_shutdown(socket_path: PathBuf) -> Result<()> {
  let result: ShutdownResult = Client::new(socket_path).call(Method::Shutdown).await?;
  println!("{}", result.message);
  Ok(())
}
