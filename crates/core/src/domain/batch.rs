use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error_kind::CompilerError;

/// One input file's worth of compiler errors, processed as a unit.
/// Immutable after construction; `ErrorBatch::new` is the only constructor
/// and enforces the non-empty invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBatch {
  pub batch_id: Uuid,
  pub source_file: String,
  pub detected_at: DateTime<Utc>,
  errors: Vec<CompilerError>,
  pub checksum: String,
  /// Set when the parser truncated the input to `maxErrorsPerBatch`.
  pub truncated_from: Option<usize>,
}

impl ErrorBatch {
  /// Builds a batch from a non-empty, ordered list of errors.
  ///
  /// Returns `None` if `errors` is empty — callers should treat an empty
  /// parse result as `UNPARSABLE`, not construct a batch.
  pub fn new(
    source_file: impl Into<String>,
    checksum: impl Into<String>,
    errors: Vec<CompilerError>,
    truncated_from: Option<usize>,
  ) -> Option<Self> {
    if errors.is_empty() {
      return None;
    }
    Some(Self {
      batch_id: Uuid::now_v7(),
      source_file: source_file.into(),
      detected_at: Utc::now(),
      errors,
      checksum: checksum.into(),
      truncated_from,
    })
  }

  pub fn errors(&self) -> &[CompilerError] {
    &self.errors
  }

  pub fn primary_error_code(&self) -> &str {
    &self.errors[0].code
  }

  pub fn has_error_severity(&self) -> bool {
    self
      .errors
      .iter()
      .any(|e| matches!(e.severity, super::error_kind::Severity::Error))
  }
}
