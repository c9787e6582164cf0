use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::finding::Stage;

/// `Detected → Claimed → Parsing → Pipelining → Assembling → Completed`,
/// with `Failed` and `DeadLettered` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
  Detected,
  Claimed,
  Parsing,
  Pipelining,
  Assembling,
  Completed,
  Failed,
  DeadLettered,
}

impl FileState {
  pub fn as_str(&self) -> &'static str {
    match self {
      FileState::Detected => "detected",
      FileState::Claimed => "claimed",
      FileState::Parsing => "parsing",
      FileState::Pipelining => "pipelining",
      FileState::Assembling => "assembling",
      FileState::Completed => "completed",
      FileState::Failed => "failed",
      FileState::DeadLettered => "dead_lettered",
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, FileState::Completed | FileState::Failed | FileState::DeadLettered)
  }

  /// Whether moving from `self` to `next` is a legal state-machine edge.
  /// Illegal transitions are a programmer error, not an operational
  /// condition — callers should treat a `false` result as a reason to
  /// panic, not to retry.
  pub fn can_transition_to(&self, next: FileState) -> bool {
    use FileState::*;
    if self.is_terminal() {
      return false;
    }
    match (*self, next) {
      (_, Failed) | (_, DeadLettered) => true,
      (Detected, Claimed) => true,
      (Claimed, Parsing) => true,
      (Parsing, Pipelining) => true,
      (Pipelining, Assembling) => true,
      (Assembling, Completed) => true,
      _ => false,
    }
  }
}

impl std::fmt::Display for FileState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl std::str::FromStr for FileState {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "detected" => Ok(FileState::Detected),
      "claimed" => Ok(FileState::Claimed),
      "parsing" => Ok(FileState::Parsing),
      "pipelining" => Ok(FileState::Pipelining),
      "assembling" => Ok(FileState::Assembling),
      "completed" => Ok(FileState::Completed),
      "failed" => Ok(FileState::Failed),
      "dead_lettered" => Ok(FileState::DeadLettered),
      other => Err(format!("unknown file state: {other}")),
    }
  }
}

/// The reason a record ended up `Failed` or `DeadLettered`, recorded in
/// `last_error` and surfaced in failure booklets and status output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FailureReason {
  Unparsable,
  StageFailed { stage: Stage, reason: String },
  AssemblyError(String),
  DeadLettered(String),
}

impl std::fmt::Display for FailureReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      FailureReason::Unparsable => write!(f, "UNPARSABLE"),
      FailureReason::StageFailed { stage, reason } => write!(f, "stage={stage}, reason={reason}"),
      FailureReason::AssemblyError(reason) => write!(f, "ASSEMBLY_ERROR: {reason}"),
      FailureReason::DeadLettered(reason) => write!(f, "DEAD_LETTERED: {reason}"),
    }
  }
}

/// Mutable, persisted record tracking one input file through the pipeline.
/// `file_name` is the unique key; at most one record per `file_name` may be
/// in a non-terminal state across the whole instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileProcessingRecord {
  pub file_name: String,
  pub checksum: String,
  pub state: FileState,
  pub detected_at: DateTime<Utc>,
  pub claimed_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
  pub attempts: u32,
  pub last_error: Option<String>,
  pub booklet_path: Option<String>,
}

impl FileProcessingRecord {
  pub fn new(file_name: impl Into<String>, checksum: impl Into<String>) -> Self {
    Self {
      file_name: file_name.into(),
      checksum: checksum.into(),
      state: FileState::Detected,
      detected_at: Utc::now(),
      claimed_at: None,
      completed_at: None,
      attempts: 0,
      last_error: None,
      booklet_path: None,
    }
  }

  /// Applies a state transition, panicking if it violates the state
  /// machine. The store is expected to only ever call this after it has
  /// already re-read the current row inside the transaction.
  pub fn transition(&mut self, next: FileState) {
    if !self.state.can_transition_to(next) {
      panic!("illegal transition for {}: {:?} -> {:?}", self.file_name, self.state, next);
    }
    self.state = next;
    if next == FileState::Claimed {
      self.claimed_at = Some(Utc::now());
    }
    if next.is_terminal() {
      self.completed_at = Some(Utc::now());
    }
  }
}
