use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finding::Stage;

/// Bus topics. Each stage has an `input` and `output` topic; `parse.*` and
/// `booklet.requested`/`dead.letter` are the pipeline's entry and exit
/// points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
  ParseRequested,
  ParseCompleted,
  StageInput(Stage),
  StageOutput(Stage),
  BookletRequested,
  DeadLetter,
}

impl Topic {
  pub fn as_str(&self) -> String {
    match self {
      Topic::ParseRequested => "parse.requested".to_string(),
      Topic::ParseCompleted => "parse.completed".to_string(),
      Topic::StageInput(stage) => format!("{}.input", stage.as_str()),
      Topic::StageOutput(stage) => format!("{}.output", stage.as_str()),
      Topic::BookletRequested => "booklet.requested".to_string(),
      Topic::DeadLetter => "dead.letter".to_string(),
    }
  }

  /// The topic a successful finding for `stage` publishes to next, per
  /// §4.5: stage N's output feeds stage N+1's input, or `booklet.requested`
  /// for the last stage.
  pub fn next_after(stage: Stage) -> Topic {
    match stage.next() {
      Some(next_stage) => Topic::StageInput(next_stage),
      None => Topic::BookletRequested,
    }
  }
}

impl std::fmt::Display for Topic {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// A durable, outbox-pattern message bridging a DB state change to a queue
/// publish. Created in the same local transaction as the state update that
/// produced it; published strictly-once per `message_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxMessage {
  pub message_id: Uuid,
  pub batch_id: Uuid,
  pub topic: Topic,
  pub payload: Vec<u8>,
  pub created_at: DateTime<Utc>,
  pub published_at: Option<DateTime<Utc>>,
  pub attempts: u32,
  pub next_attempt_at: DateTime<Utc>,
}

impl OutboxMessage {
  pub fn new(batch_id: Uuid, topic: Topic, payload: Vec<u8>) -> Self {
    let now = Utc::now();
    Self {
      message_id: Uuid::now_v7(),
      batch_id,
      topic,
      payload,
      created_at: now,
      published_at: None,
      attempts: 0,
      next_attempt_at: now,
    }
  }
}
