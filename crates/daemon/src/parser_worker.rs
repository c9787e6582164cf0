//! Parser worker (C3): turns a claimed file's content into an `ErrorBatch`.

use std::sync::Arc;

use aires_bus::SharedReceiver;
use aires_core::domain::{FileState, Topic};
use aires_core::Result;
use aires_db::Store;
use aires_parser::{ParseOutcome, ParserRegistry};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::activity::ActivityTracker;
use crate::concurrency::ConcurrencyGate;
use crate::payload::{DeadLetterPayload, ParseRequestedPayload, StagePayload};
use aires_core::domain::{ErrorBatch, OutboxMessage};

/// Parses claimed files into `ErrorBatch`es. A pool of these (sized to
/// `maxConcurrentBatches`) shares one `ParseRequested` receiver, so
/// different files are parsed in parallel instead of one at a time.
pub struct ParserWorker {
  store: Store,
  registry: Arc<ParserRegistry>,
  gate: Arc<ConcurrencyGate>,
  activity: Arc<ActivityTracker>,
}

impl ParserWorker {
  pub fn new(store: Store, registry: Arc<ParserRegistry>, gate: Arc<ConcurrencyGate>, activity: Arc<ActivityTracker>) -> Self {
    Self { store, registry, gate, activity }
  }

  pub async fn run(self, rx: SharedReceiver, mut shutdown: watch::Receiver<bool>) {
    loop {
      tokio::select! {
        message = Self::recv(&rx) => {
          match message {
            Some(message) => {
              self.activity.touch("parser");
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
  }

  async fn recv(rx: &SharedReceiver) -> Option<OutboxMessage> {
    rx.lock().await.recv().await
  }

  async fn handle(&self, message: OutboxMessage) {
    let payload: ParseRequestedPayload = match serde_json::from_slice(&message.payload) {
      Ok(payload) => payload,
      Err(e) => {
        warn!("poison ParseRequested message, dropping: {e}");
        return;
      }
    };
    if let Err(e) = self.process(payload).await {
      warn!("parser worker failed: {e}");
    }
  }

  async fn process(&self, payload: ParseRequestedPayload) -> Result<()> {
    let content = match std::fs::read_to_string(&payload.file_path) {
      Ok(content) => content,
      Err(e) => {
        return self.fail_unparsable(&payload, format!("unreadable or invalid UTF-8: {e}")).await;
      }
    };

    match self.registry.parse(&payload.file_name, &content) {
      ParseOutcome::Batch(mut batch) => {
        if !batch.has_error_severity() {
          return self.fail_unparsable(&payload, "no error-severity diagnostics found".to_string()).await;
        }
        batch.batch_id = payload.pending_id;
        self.pipeline_batch(batch).await
      }
      ParseOutcome::Unparsable => self.fail_unparsable(&payload, "no recognizable diagnostics".to_string()).await,
    }
  }

  async fn pipeline_batch(&self, batch: ErrorBatch) -> Result<()> {
    let batch_id = batch.batch_id;
    let source_file = batch.source_file.clone();
    self.store.insert_batch(batch).await?;
    self.gate.acquire(batch_id).await;

    let first_stage = aires_core::domain::Stage::ALL[0];
    let stage_payload = StagePayload { batch_id };
    let message = OutboxMessage::new(batch_id, Topic::StageInput(first_stage), serde_json::to_vec(&stage_payload)?);
    self.store.insert_outbox_message(message).await?;
    self.store.transition_record(source_file.clone(), FileState::Pipelining, None, None).await?;
    info!(batch_id = %batch_id, file = %source_file, "batch parsed, entering pipeline");
    Ok(())
  }

  async fn fail_unparsable(&self, payload: &ParseRequestedPayload, reason: String) -> Result<()> {
    warn!(file = %payload.file_name, reason = %reason, "parse failed");
    self.store.transition_record(payload.file_name.clone(), FileState::Failed, Some("UNPARSABLE".to_string()), None).await?;
    let dead_letter = DeadLetterPayload { batch_id: payload.pending_id, file_name: payload.file_name.clone(), stage: None, reason };
    let message = OutboxMessage::new(payload.pending_id, Topic::DeadLetter, serde_json::to_vec(&dead_letter)?);
    self.store.insert_outbox_message(message).await?;
    Ok(())
  }
}
