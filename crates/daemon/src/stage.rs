//! Stage workers (C6): the four analysis stages share one skeleton,
//! differing only in which `Stage`/`StageConfig` they're instantiated with.
//! A pool of workers (sized to `maxConcurrentBatches`) shares each stage's
//! input receiver, so different batches run a stage in parallel instead
//! of strictly one at a time.

use std::sync::Arc;
use std::time::Duration;

use aires_bus::SharedReceiver;
use aires_core::config::StageConfig;
use aires_core::domain::{OutboxMessage, Stage, Topic};
use aires_core::Result;
use aires_db::Store;
use aires_llm::AiClient;
use rand::Rng;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::activity::ActivityTracker;
use crate::payload::{BookletRequestedPayload, DeadLetterPayload, StagePayload};

#[derive(Clone)]
pub struct StageWorker {
  stage: Stage,
  store: Store,
  client: Arc<AiClient>,
  config: StageConfig,
  max_stage_attempts: u32,
  activity: Arc<ActivityTracker>,
}

impl StageWorker {
  pub fn new(
    stage: Stage,
    store: Store,
    client: Arc<AiClient>,
    config: StageConfig,
    max_stage_attempts: u32,
    activity: Arc<ActivityTracker>,
  ) -> Self {
    Self { stage, store, client, config, max_stage_attempts, activity }
  }

  pub async fn run(self, rx: SharedReceiver, mut shutdown: watch::Receiver<bool>) {
    info!(stage = %self.stage, "stage worker started");
    loop {
      tokio::select! {
        message = Self::recv(&rx) => {
          match message {
            Some(message) => {
              self.activity.touch(self.stage.as_str());
              self.handle(message).await
            }
            None => break,
          }
        }
        _ = shutdown.changed() => {
          if *shutdown.borrow() {
            break;
          }
        }
      }
    }
    info!(stage = %self.stage, "stage worker stopped");
  }

  async fn recv(rx: &SharedReceiver) -> Option<OutboxMessage> {
    rx.lock().await.recv().await
  }

  async fn handle(&self, message: OutboxMessage) {
    let payload: StagePayload = match serde_json::from_slice(&message.payload) {
      Ok(payload) => payload,
      Err(e) => {
        warn!(stage = %self.stage, "poison stage message, dropping: {e}");
        return;
      }
    };
    if let Err(e) = self.process(payload.batch_id).await {
      error!(stage = %self.stage, batch_id = %payload.batch_id, "stage processing failed: {e}");
    }
  }

  async fn process(&self, batch_id: Uuid) -> Result<()> {
    // Idempotency: a redelivered message whose finding already landed is a no-op.
    if self.store.get_finding(batch_id, self.stage).await?.is_some() {
      return Ok(());
    }

    let Some(batch) = self.store.get_batch(batch_id).await? else {
      warn!(batch_id = %batch_id, stage = %self.stage, "batch not found, dropping stage message");
      return Ok(());
    };
    let prior_findings = self.store.findings_for_batch(batch_id).await?;

    match self.client.analyze(self.stage, &self.config, &batch, &prior_findings).await {
      Ok(finding) => {
        let topic = Topic::next_after(self.stage);
        let payload = match topic {
          Topic::BookletRequested => serde_json::to_vec(&BookletRequestedPayload { batch_id })?,
          _ => serde_json::to_vec(&StagePayload { batch_id })?,
        };
        let message = OutboxMessage::new(batch_id, topic, payload);
        self.store.insert_finding_and_publish(finding, message).await?;
        info!(batch_id = %batch_id, stage = %self.stage, "stage completed");
        Ok(())
      }
      Err(e) => {
        let retryable = e.is_retryable();
        if retryable {
          // `maxStageAttempts` counts retries, not total calls (§8 S3):
          // 1 initial call plus up to `max_stage_attempts` retries before
          // giving up, so a retry is still allowed once `attempts` reaches
          // `max_stage_attempts` itself — it's the retry about to be spent.
          let attempts = self.store.increment_attempts(batch.source_file.clone()).await?;
          if attempts <= self.max_stage_attempts {
            self.schedule_requeue(batch_id, attempts);
            return Ok(());
          }
        }
        warn!(batch_id = %batch_id, stage = %self.stage, retryable, "stage failed: {e}");
        self.dead_letter(batch_id, batch.source_file.clone(), format!("{e}")).await
      }
    }
  }

  /// Re-inserts a `StageInput` outbox row after a jittered backoff, so the
  /// retry survives a crash (the durable outbox, not an in-memory timer, is
  /// what actually redelivers the message).
  fn schedule_requeue(&self, batch_id: Uuid, attempts: u32) {
    let store = self.store.clone();
    let stage = self.stage;
    let delay = backoff_delay(attempts);
    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      let payload = match serde_json::to_vec(&StagePayload { batch_id }) {
        Ok(payload) => payload,
        Err(e) => {
          error!("failed to serialize requeue payload: {e}");
          return;
        }
      };
      let message = OutboxMessage::new(batch_id, Topic::StageInput(stage), payload);
      if let Err(e) = store.insert_outbox_message(message).await {
        error!(batch_id = %batch_id, "failed to requeue stage message: {e}");
      }
    });
  }

  async fn dead_letter(&self, batch_id: Uuid, file_name: String, reason: String) -> Result<()> {
    let payload = DeadLetterPayload { batch_id, file_name, stage: Some(self.stage), reason };
    let message = OutboxMessage::new(batch_id, Topic::DeadLetter, serde_json::to_vec(&payload)?);
    self.store.insert_outbox_message(message).await
  }
}

/// `100ms * 2^n` capped at 60s with independent jitter, matching the
/// outbox publisher's backoff shape (§4.3) applied here to stage retries.
fn backoff_delay(attempts: u32) -> Duration {
  let base = Duration::from_millis(100);
  let max = Duration::from_secs(60);
  let exp = base.saturating_mul(1u32.checked_shl(attempts).unwrap_or(u32::MAX).max(1));
  let capped = exp.min(max);
  let jitter = rand::rng().random_range(0.5..1.5);
  capped.mul_f64(jitter)
}
