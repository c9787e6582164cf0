//! Wire payloads carried inside `OutboxMessage::payload`.
//!
//! Every payload is intentionally thin: the receiving worker re-reads the
//! authoritative `ErrorBatch`/`AIResearchFinding` rows from the state store
//! rather than trusting anything beyond an id, so a stale or replayed
//! payload can never diverge from the store's view.

use std::path::PathBuf;

use aires_core::domain::Stage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseRequestedPayload {
  pub pending_id: Uuid,
  pub file_name: String,
  pub file_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagePayload {
  pub batch_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookletRequestedPayload {
  pub batch_id: Uuid,
}

/// Published by a stage worker (or the parser, for `UNPARSABLE`) whenever a
/// batch cannot proceed. `stage: None` marks a pre-pipeline failure (parse
/// failure); `Some(stage)` marks a stage-level failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterPayload {
  pub batch_id: Uuid,
  pub file_name: String,
  pub stage: Option<Stage>,
  pub reason: String,
}
