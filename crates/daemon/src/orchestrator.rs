//! Orchestrator (C7): assembles completed batches into booklets and
//! retires dead-lettered ones, in both cases freeing the batch's
//! concurrency slot and moving its input file out of the watch directory.

use std::sync::Arc;

use aires_bus::SharedReceiver;
use aires_core::domain::{FailureReason, FileState, OutboxMessage};
use aires_core::Result;
use aires_db::Store;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::activity::ActivityTracker;
use crate::archive::Archive;
use crate::booklet::BookletAssembler;
use crate::concurrency::ConcurrencyGate;
use crate::payload::{BookletRequestedPayload, DeadLetterPayload};

pub struct Orchestrator {
  store: Store,
  assembler: BookletAssembler,
  archive: Archive,
  gate: Arc<ConcurrencyGate>,
  activity: Arc<ActivityTracker>,
}

impl Orchestrator {
  pub fn new(
    store: Store,
    assembler: BookletAssembler,
    archive: Archive,
    gate: Arc<ConcurrencyGate>,
    activity: Arc<ActivityTracker>,
  ) -> Self {
    Self { store, assembler, archive, gate, activity }
  }

  pub async fn run(self, booklet_rx: SharedReceiver, dead_letter_rx: SharedReceiver, mut shutdown: watch::Receiver<bool>) {
    info!("orchestrator started");
    loop {
      tokio::select! {
        message = Self::recv(&booklet_rx) => {
          match message {
            Some(message) => {
              self.activity.touch("orchestrator");
              self.handle_booklet_requested(message).await
            }
            None => break,
          }
        }
        message = Self::recv(&dead_letter_rx) => {
          match message {
            Some(message) => {
              self.activity.touch("orchestrator");
              self.handle_dead_letter(message).await
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
    info!("orchestrator stopped");
  }

  async fn recv(rx: &SharedReceiver) -> Option<OutboxMessage> {
    rx.lock().await.recv().await
  }

  async fn handle_booklet_requested(&self, message: OutboxMessage) {
    let payload: BookletRequestedPayload = match serde_json::from_slice(&message.payload) {
      Ok(payload) => payload,
      Err(e) => {
        warn!("poison BookletRequested message, dropping: {e}");
        return;
      }
    };
    if let Err(e) = self.assemble(payload.batch_id).await {
      error!(batch_id = %payload.batch_id, "booklet assembly failed: {e}");
    }
  }

  async fn assemble(&self, batch_id: uuid::Uuid) -> Result<()> {
    let Some(batch) = self.store.get_batch(batch_id).await? else {
      warn!(batch_id = %batch_id, "booklet requested for unknown batch, dropping");
      return Ok(());
    };
    let findings = self.store.findings_for_batch(batch_id).await?;
    if findings.len() < aires_core::domain::Stage::ALL.len() {
      warn!(batch_id = %batch_id, found = findings.len(), "booklet requested before all stages completed, dropping");
      return Ok(());
    }

    self.store.transition_record(batch.source_file.clone(), FileState::Assembling, None, None).await?;

    match self.assembler.assemble(&batch, &findings).await {
      Ok(booklet) => {
        self.store.transition_record(batch.source_file.clone(), FileState::Completed, None, Some(booklet.file_name.clone())).await?;
        if let Err(e) = self.archive.move_to_processed(&batch.source_file).await {
          warn!(batch_id = %batch_id, "failed to archive processed input file: {e}");
        }
        info!(batch_id = %batch_id, booklet = %booklet.file_name, "batch completed");
      }
      Err(e) => {
        let reason = FailureReason::AssemblyError(e.to_string()).to_string();
        self.store.transition_record(batch.source_file.clone(), FileState::Failed, Some(reason.clone()), None).await?;
        if let Err(archive_err) = self.archive.move_to_failed(&batch.source_file, &reason).await {
          warn!(batch_id = %batch_id, "failed to archive failed input file: {archive_err}");
        }
        error!(batch_id = %batch_id, "assembly failed: {e}");
      }
    }
    self.gate.release(batch_id);
    Ok(())
  }

  async fn handle_dead_letter(&self, message: OutboxMessage) {
    let payload: DeadLetterPayload = match serde_json::from_slice(&message.payload) {
      Ok(payload) => payload,
      Err(e) => {
        warn!("poison DeadLetter message, dropping: {e}");
        return;
      }
    };
    if let Err(e) = self.retire(payload).await {
      error!("dead-letter handling failed: {e}");
    }
  }

  async fn retire(&self, payload: DeadLetterPayload) -> Result<()> {
    let batch = self.store.get_batch(payload.batch_id).await?;
    let partial_findings = self.store.findings_for_batch(payload.batch_id).await?;

    let reason = match payload.stage {
      Some(stage) => FailureReason::StageFailed { stage, reason: payload.reason.clone() }.to_string(),
      None => FailureReason::Unparsable.to_string(),
    };

    let booklet = self
      .assembler
      .assemble_failure(payload.batch_id, batch.as_ref(), payload.stage, &reason, &partial_findings)
      .await?;

    self
      .store
      .transition_record(payload.file_name.clone(), FileState::Failed, Some(reason.clone()), Some(booklet.file_name.clone()))
      .await?;

    if let Err(e) = self.archive.move_to_failed(&payload.file_name, &reason).await {
      warn!(file = %payload.file_name, "failed to archive dead-lettered input file: {e}");
    }

    self.gate.release(payload.batch_id);
    warn!(batch_id = %payload.batch_id, file = %payload.file_name, %reason, "batch dead-lettered");
    Ok(())
  }
}
