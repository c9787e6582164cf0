//! Wires every component together and drives the daemon's run loop:
//! start everything, wait for a shutdown signal, stop everything within
//! `shutdownGraceSeconds`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aires_bus::{BusHandle, OutboxPublisher, PublisherConfig};
use aires_core::config::{Backend, Config};
use aires_core::domain::{Stage, Topic};
use aires_core::Result;
use aires_db::Store;
use aires_llm::{AiClient, CloudHttpProvider, LlmBackend, LocalHttpProvider, RateLimitConfig};
use aires_parser::ParserRegistry;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::activity::ActivityTracker;
use crate::archive::Archive;
use crate::booklet::BookletAssembler;
use crate::concurrency::ConcurrencyGate;
use crate::control::ControlServer;
use crate::orchestrator::Orchestrator;
use crate::parser_worker::ParserWorker;
use crate::stage::StageWorker;
use crate::status::DaemonStatus;
use crate::watcher::Watcher;

pub struct Daemon {
  config: Config,
  config_path: PathBuf,
}

impl Daemon {
  pub fn new(config: Config, config_path: PathBuf) -> Self {
    Self { config, config_path }
  }

  pub async fn run(self) -> Result<()> {
    let config = self.config;
    info!(input = %config.input_directory.display(), output = %config.output_directory.display(), "starting aires daemon");

    let store = Store::open(config.db.connection_string.clone()).await?;
    let bus = Arc::new(BusHandle::new());
    let activity = Arc::new(ActivityTracker::new());
    let gate = Arc::new(ConcurrencyGate::new(config.max_concurrent_batches));

    let status = Arc::new(DaemonStatus::new(
      store.clone(),
      activity.clone(),
      gate.clone(),
      config.clone(),
      self.config_path.clone(),
    )?);
    let draining = status.draining_flag();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let watcher = Watcher::new(
      store.clone(),
      config.input_directory.clone(),
      &config.file_pattern,
      Duration::from_secs(config.poll_interval_seconds),
      Duration::from_secs(config.stable_for),
      draining,
      activity.clone(),
    )?;

    let registry = Arc::new(ParserRegistry::with_defaults(config.max_errors_per_batch));

    let client = Arc::new(build_ai_client(&config));

    let assembler = BookletAssembler::new(config.output_directory.clone());
    let archive = Archive::new(config.input_directory.clone(), config.retention_days);
    let orchestrator = Orchestrator::new(store.clone(), assembler, archive, gate.clone(), activity.clone());

    let publisher = OutboxPublisher::new(
      store.clone(),
      bus.clone(),
      PublisherConfig { max_attempts: config.max_publish_attempts, ..PublisherConfig::default() },
    );

    let control = ControlServer::new(config.control_socket_path.clone(), status.clone(), shutdown_tx.clone());

    // Every topic's receiver must be taken before the corresponding
    // producer starts publishing, since `BusHandle::subscribe` panics on
    // a second call for the same topic.
    let parser_rx = bus.subscribe(Topic::ParseRequested);
    let booklet_rx = bus.subscribe(Topic::BookletRequested);
    let dead_letter_rx = bus.subscribe(Topic::DeadLetter);
    let stage_rx: HashMap<Stage, _> = Stage::ALL.iter().map(|&stage| (stage, bus.subscribe(Topic::StageInput(stage)))).collect();

    let mut handles = Vec::new();

    handles.push(tokio::spawn(watcher.run(shutdown_rx.clone())));
    handles.push(tokio::spawn(orchestrator.run(booklet_rx, dead_letter_rx, shutdown_rx.clone())));

    // A pool of workers per topic, sized to `maxConcurrentBatches`, shares
    // that topic's receiver so different batches progress in parallel
    // rather than strictly one at a time; `ConcurrencyGate` still bounds
    // how many batches are in flight across the whole pipeline.
    let pool_size = config.max_concurrent_batches.max(1);

    for _ in 0..pool_size {
      let worker = ParserWorker::new(store.clone(), registry.clone(), gate.clone(), activity.clone());
      handles.push(tokio::spawn(worker.run(parser_rx.clone(), shutdown_rx.clone())));
    }

    for (stage, rx) in stage_rx {
      for _ in 0..pool_size {
        let worker = StageWorker::new(
          stage,
          store.clone(),
          client.clone(),
          config.stages.get(stage).clone(),
          config.max_stage_attempts,
          activity.clone(),
        );
        handles.push(tokio::spawn(worker.run(rx.clone(), shutdown_rx.clone())));
      }
    }

    let publisher_shutdown = shutdown_rx.clone();
    handles.push(tokio::spawn(async move { publisher.run(publisher_shutdown).await }));

    let archive_sweep = Archive::new(config.input_directory.clone(), config.retention_days);
    let mut sweep_shutdown = shutdown_rx.clone();
    handles.push(tokio::spawn(async move {
      let mut interval = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
      loop {
        tokio::select! {
          _ = interval.tick() => {
            if let Err(e) = archive_sweep.sweep().await {
              warn!("retention sweep failed: {e}");
            }
          }
          _ = sweep_shutdown.changed() => {
            if *sweep_shutdown.borrow() {
              break;
            }
          }
        }
      }
    }));

    let control_shutdown = shutdown_rx.clone();
    handles.push(tokio::spawn(async move {
      if let Err(e) = control.run(control_shutdown).await {
        error!("control server stopped with error: {e}");
      }
    }));

    let ctrl_c_shutdown_tx = shutdown_tx.clone();
    tokio::spawn(async move {
      if let Err(e) = signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        return;
      }
      info!("received ctrl-c, shutting down");
      let _ = ctrl_c_shutdown_tx.send(true);
    });

    let mut shutdown_signal = shutdown_rx.clone();
    while !*shutdown_signal.borrow() {
      if shutdown_signal.changed().await.is_err() {
        break;
      }
    }

    let grace = Duration::from_secs(config.shutdown_grace_seconds);
    if tokio::time::timeout(grace, futures::future::join_all(handles)).await.is_err() {
      warn!("components did not stop within shutdownGraceSeconds, proceeding with exit");
    }

    info!("aires daemon shutdown complete");
    Ok(())
  }
}

fn build_ai_client(config: &Config) -> AiClient {
  let mut backends: HashMap<Backend, Arc<dyn LlmBackend>> = HashMap::new();
  backends.insert(Backend::LocalHttp, Arc::new(LocalHttpProvider::new()));

  let cloud_key = std::env::var("AIRES_CLOUD_API_KEY").unwrap_or_default();
  backends.insert(Backend::CloudHttp, Arc::new(CloudHttpProvider::new(cloud_key)));

  let mut rate_limits = HashMap::new();
  rate_limits.insert(Backend::LocalHttp, RateLimitConfig::default());
  rate_limits.insert(Backend::CloudHttp, RateLimitConfig::default());

  AiClient::new(backends, rate_limits, Duration::from_secs(config.queue_wait_seconds))
}
