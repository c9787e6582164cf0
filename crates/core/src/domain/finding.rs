use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One AI analysis step with a fixed role in the pipeline. Stage order is
/// strict and not parallelizable for a single batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  Docs,
  Context,
  Pattern,
  Synth,
}

impl Stage {
  pub const ALL: [Stage; 4] = [Stage::Docs, Stage::Context, Stage::Pattern, Stage::Synth];

  pub fn as_str(&self) -> &'static str {
    match self {
      Stage::Docs => "docs",
      Stage::Context => "context",
      Stage::Pattern => "pattern",
      Stage::Synth => "synth",
    }
  }

  pub fn index(&self) -> usize {
    match self {
      Stage::Docs => 0,
      Stage::Context => 1,
      Stage::Pattern => 2,
      Stage::Synth => 3,
    }
  }

  pub fn next(&self) -> Option<Stage> {
    match self {
      Stage::Docs => Some(Stage::Context),
      Stage::Context => Some(Stage::Pattern),
      Stage::Pattern => Some(Stage::Synth),
      Stage::Synth => None,
    }
  }

  /// Default per-call deadline, per §4.4's per-stage defaults.
  pub fn default_timeout_seconds(&self) -> u64 {
    match self {
      Stage::Docs => 30,
      Stage::Context => 60,
      Stage::Pattern => 45,
      Stage::Synth => 120,
    }
  }
}

impl std::fmt::Display for Stage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl std::str::FromStr for Stage {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "docs" => Ok(Stage::Docs),
      "context" => Ok(Stage::Context),
      "pattern" => Ok(Stage::Pattern),
      "synth" => Ok(Stage::Synth),
      other => Err(format!("unknown stage: {other}")),
    }
  }
}

/// The structured output of a single stage for a single batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIResearchFinding {
  pub stage: Stage,
  pub batch_id: Uuid,
  pub produced_at: DateTime<Utc>,
  /// Self-assessed confidence in `[0, 1]`.
  pub confidence: f64,
  pub summary: String,
  pub details: serde_json::Map<String, serde_json::Value>,
  /// The raw model response, kept for audit even after parsing.
  pub raw_model_response: String,
  pub model: String,
}

impl AIResearchFinding {
  pub fn confidence_clamped(&self) -> f64 {
    self.confidence.clamp(0.0, 1.0)
  }
}
