use std::sync::Arc;
use std::time::Duration;

use aires_core::domain::{FailureReason, FileState, OutboxMessage};
use aires_core::Result;
use aires_db::Store;
use chrono::Utc;
use rand::Rng;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::partitions::BusHandle;

#[derive(Debug, Clone)]
pub struct PublisherConfig {
  /// `maxPublishAttempts`, default 10.
  pub max_attempts: u32,
  pub poll_interval: Duration,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for PublisherConfig {
  fn default() -> Self {
    Self {
      max_attempts: 10,
      poll_interval: Duration::from_millis(250),
      base_delay: Duration::from_millis(100),
      max_delay: Duration::from_secs(60),
    }
  }
}

/// Single-threaded-per-instance background task draining unpublished
/// outbox rows onto the bus, in creation order, with exponential backoff
/// on publish failure. Single-threaded to preserve per-partition order;
/// safe because publish is I/O-bound, not CPU-bound.
pub struct OutboxPublisher {
  store: Store,
  bus: Arc<BusHandle>,
  config: PublisherConfig,
}

impl OutboxPublisher {
  pub fn new(store: Store, bus: Arc<BusHandle>, config: PublisherConfig) -> Self {
    Self { store, bus, config }
  }

  pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(self.config.poll_interval);
    loop {
      tokio::select! {
        _ = interval.tick() => {
          if let Err(e) = self.drain_once().await {
            warn!("outbox publisher pass failed: {e}");
          }
        }
        _ = shutdown.changed() => {
          if *shutdown.borrow() {
            info!("outbox publisher shutting down");
            break;
          }
        }
      }
    }
  }

  async fn drain_once(&self) -> Result<()> {
    let pending = self.store.list_unpublished(100).await?;
    for message in pending {
      match self.bus.publish(message.topic, message.clone()).await {
        Ok(()) => {
          self.store.mark_published(message.message_id).await?;
        }
        Err(_) => {
          let delay = self.backoff_delay(message.attempts);
          let next_attempt_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
          let attempts = self.store.record_publish_failure(message.message_id, next_attempt_at).await?;
          if attempts >= self.config.max_attempts {
            warn!(
              message_id = %message.message_id,
              batch_id = %message.batch_id,
              "publish attempts exhausted, moving to dead.letter"
            );
            self.store.dead_letter(message.message_id).await?;
            self.mark_batch_dead_lettered(&message).await?;
          }
        }
      }
    }
    Ok(())
  }

  /// Marks the batch's `FileProcessingRecord` `DeadLettered`, per the
  /// outbox contract: exhausting `maxPublishAttempts` dead-letters the
  /// batch itself, distinct from a stage exceeding `maxStageAttempts`
  /// (which marks the batch `Failed` instead). The file name is read
  /// straight out of the payload's JSON when the field is present
  /// (`ParseRequestedPayload`/`DeadLetterPayload`, before an `ErrorBatch`
  /// necessarily exists), falling back to `batch_sources` for payloads
  /// that only carry a `batch_id`. No-op if the record can't be resolved,
  /// or has already reached a terminal state through another path.
  async fn mark_batch_dead_lettered(&self, message: &OutboxMessage) -> Result<()> {
    let file_name = serde_json::from_slice::<serde_json::Value>(&message.payload)
      .ok()
      .and_then(|value| value.get("file_name").and_then(|v| v.as_str()).map(str::to_string));

    let file_name = match file_name {
      Some(name) => Some(name),
      None => self.store.file_name_for_batch(message.batch_id).await?,
    };

    let Some(file_name) = file_name else {
      warn!(batch_id = %message.batch_id, "could not resolve file for dead-lettered message, record left untouched");
      return Ok(());
    };

    let Some(record) = self.store.get_record(file_name.clone()).await? else { return Ok(()) };
    if record.state.is_terminal() {
      return Ok(());
    }

    let reason = FailureReason::DeadLettered(format!("outbox message {} exhausted publish attempts", message.message_id));
    self.store.transition_record(file_name, FileState::DeadLettered, Some(reason.to_string()), None).await?;
    Ok(())
  }

  /// `100ms * 2^n`, capped at `max_delay`, with independent jitter drawn
  /// per retry so correlated failures don't resynchronize.
  fn backoff_delay(&self, attempts: u32) -> Duration {
    let exp = self.config.base_delay.saturating_mul(1u32.checked_shl(attempts).unwrap_or(u32::MAX).max(1));
    let capped = exp.min(self.config.max_delay);
    let jitter = rand::rng().random_range(0.5..1.5);
    capped.mul_f64(jitter)
  }
}
