use std::fmt::Write as _;

use aires_core::domain::{AIResearchFinding, ErrorBatch};

/// Deterministic serialization of a batch plus the prior stages' findings,
/// appended to the stage's configured system prompt. Deterministic so that
/// the same batch state always produces the same prompt text, which keeps
/// retries and crash-recovery replays from drifting.
pub fn compose_prompt(system_prompt: &str, batch: &ErrorBatch, prior_findings: &[AIResearchFinding]) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{}", system_prompt);
  let _ = writeln!(out);
  let _ = writeln!(out, "## Compiler errors (source: {})", batch.source_file);
  for error in batch.errors() {
    let _ = writeln!(
      out,
      "- [{}] {}:{}{} {} ({})",
      error.severity,
      error.location.file_path,
      error.location.line,
      error.location.column.map(|c| format!(":{c}")).unwrap_or_default(),
      error.message,
      error.code,
    );
  }

  if !prior_findings.is_empty() {
    let _ = writeln!(out);
    let _ = writeln!(out, "## Prior stage findings");
    for finding in prior_findings {
      let _ = writeln!(out, "### {} (confidence {:.2})", finding.stage, finding.confidence_clamped());
      let _ = writeln!(out, "{}", finding.summary);
    }
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use aires_core::domain::{CompilerError, ErrorLocation, Severity, Stage};
  use chrono::Utc;
  use uuid::Uuid;

  fn sample_batch() -> ErrorBatch {
    let error = CompilerError {
      code: "E0308".to_string(),
      message: "mismatched types".to_string(),
      severity: Severity::Error,
      location: ErrorLocation { file_path: "src/main.rs".to_string(), line: 10, column: Some(5) },
      raw_line: "error[E0308]: mismatched types".to_string(),
    };
    ErrorBatch::new("build.log", "deadbeef", vec![error], None).unwrap()
  }

  #[test]
  fn includes_batch_errors_and_prior_findings() {
    let batch = sample_batch();
    let finding = AIResearchFinding {
      stage: Stage::Docs,
      batch_id: Uuid::now_v7(),
      produced_at: Utc::now(),
      confidence: 0.8,
      summary: "E0308 means a type mismatch".to_string(),
      details: serde_json::Map::new(),
      raw_model_response: "{}".to_string(),
      model: "default".to_string(),
    };

    let prompt = compose_prompt("system prompt", &batch, std::slice::from_ref(&finding));
    assert!(prompt.contains("system prompt"));
    assert!(prompt.contains("E0308"));
    assert!(prompt.contains("mismatched types"));
    assert!(prompt.contains("E0308 means a type mismatch"));
  }

  #[test]
  fn omits_prior_findings_section_when_empty() {
    let batch = sample_batch();
    let prompt = compose_prompt("system prompt", &batch, &[]);
    assert!(!prompt.contains("Prior stage findings"));
  }
}
