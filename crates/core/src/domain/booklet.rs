use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finding::AIResearchFinding;

/// The final Markdown artifact merging all findings for a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchBooklet {
  pub booklet_id: Uuid,
  pub batch_id: Uuid,
  pub generated_at: DateTime<Utc>,
  pub file_name: String,
  pub content: String,
  /// Four findings in stage order, or fewer for a failure booklet.
  pub findings: Vec<AIResearchFinding>,
}

impl ResearchBooklet {
  /// Confidence is defined as the minimum of its findings' confidences.
  pub fn confidence(&self) -> f64 {
    self
      .findings
      .iter()
      .map(|f| f.confidence_clamped())
      .fold(f64::INFINITY, f64::min)
      .min(1.0)
  }

  /// `YYYY-MM-DD_HH-MM-SS_<primaryErrorCode>_<shortId>.md`
  pub fn file_name_for(
    generated_at: DateTime<Utc>,
    primary_error_code: &str,
    short_id: &str,
  ) -> String {
    format!(
      "{}_{}_{}.md",
      generated_at.format("%Y-%m-%d_%H-%M-%S"),
      primary_error_code,
      short_id
    )
  }
}
