//! Booklet assembler (C8): merges findings into a single Markdown document.

use std::path::{Path, PathBuf};

use aires_core::domain::{AIResearchFinding, ErrorBatch, ResearchBooklet, Stage};
use aires_core::{AiresError, CorrelationId, Result};
use chrono::Utc;
use uuid::Uuid;

pub struct BookletAssembler {
  output_directory: PathBuf,
}

impl BookletAssembler {
  pub fn new(output_directory: PathBuf) -> Self {
    Self { output_directory }
  }

  /// Assembles and atomically writes the success booklet for a fully
  /// completed batch (all four stage findings present).
  pub async fn assemble(&self, batch: &ErrorBatch, findings: &[AIResearchFinding]) -> Result<ResearchBooklet> {
    let booklet_id = Uuid::now_v7();
    let generated_at = Utc::now();
    let short_id = CorrelationId::from_uuid(booklet_id).short();
    let primary_error_code = batch.primary_error_code();
    let file_name = ResearchBooklet::file_name_for(generated_at, primary_error_code, &short_id);
    let content = render_success(batch, findings, booklet_id, generated_at);

    let dir = self.output_directory.join(generated_at.format("%Y-%m-%d").to_string());
    let path = write_atomic(&dir, &file_name, &content, &short_id).await?;

    let booklet = ResearchBooklet {
      booklet_id,
      batch_id: batch.batch_id,
      generated_at,
      file_name: path.to_string_lossy().to_string(),
      content,
      findings: findings.to_vec(),
    };
    Ok(booklet)
  }

  /// Assembles and writes a short failure booklet: naming the stage that
  /// failed (or none, for a pre-pipeline parse failure), the reason, and
  /// any partial findings obtained before the failure.
  pub async fn assemble_failure(
    &self,
    batch_id: Uuid,
    batch: Option<&ErrorBatch>,
    failed_stage: Option<Stage>,
    reason: &str,
    partial_findings: &[AIResearchFinding],
  ) -> Result<ResearchBooklet> {
    let booklet_id = Uuid::now_v7();
    let generated_at = Utc::now();
    let short_id = CorrelationId::from_uuid(booklet_id).short();
    let primary_error_code = batch.map(|b| b.primary_error_code()).unwrap_or("UNPARSABLE");
    let file_name = ResearchBooklet::file_name_for(generated_at, primary_error_code, &short_id);
    let content = render_failure(batch, failed_stage, reason, partial_findings, booklet_id, generated_at);

    let dir = self.output_directory.join("failed").join(generated_at.format("%Y-%m-%d").to_string());
    let path = write_atomic(&dir, &file_name, &content, &short_id).await?;

    Ok(ResearchBooklet {
      booklet_id,
      batch_id,
      generated_at,
      file_name: path.to_string_lossy().to_string(),
      content,
      findings: partial_findings.to_vec(),
    })
  }
}

async fn write_atomic(dir: &Path, file_name: &str, content: &str, short_id: &str) -> Result<PathBuf> {
  tokio::fs::create_dir_all(dir).await.map_err(AiresError::Io)?;
  let mut target = dir.join(file_name);
  if tokio::fs::try_exists(&target).await.unwrap_or(false) {
    let stem = Path::new(file_name).file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    target = dir.join(format!("{stem}_{short_id}.md"));
  }
  let tmp = target.with_extension("tmp");
  tokio::fs::write(&tmp, content).await.map_err(AiresError::Io)?;
  tokio::fs::rename(&tmp, &target).await.map_err(AiresError::Io)?;
  Ok(target)
}

fn confidence_of(findings: &[AIResearchFinding]) -> f64 {
  findings.iter().map(|f| f.confidence_clamped()).fold(f64::INFINITY, f64::min).min(1.0)
}

fn render_success(batch: &ErrorBatch, findings: &[AIResearchFinding], booklet_id: Uuid, generated_at: chrono::DateTime<Utc>) -> String {
  let confidence = confidence_of(findings);
  let mut out = String::new();

  out.push_str("---\n");
  out.push_str(&format!("batch_id: {}\n", batch.batch_id));
  out.push_str(&format!("generated_at: {}\n", generated_at.to_rfc3339()));
  out.push_str(&format!("primary_error_code: {}\n", batch.primary_error_code()));
  out.push_str(&format!("confidence: {confidence:.2}\n"));
  out.push_str("stage_models:\n");
  for finding in findings {
    out.push_str(&format!("  {}: {}\n", finding.stage.as_str(), finding.model));
  }
  out.push_str("---\n\n");

  out.push_str(&format!("# Research Booklet: {}\n\n", batch.primary_error_code()));

  out.push_str("## Summary\n\n");
  if let Some(synth) = findings.iter().find(|f| f.stage == Stage::Synth) {
    out.push_str(&synth.summary);
    out.push_str("\n\n");
  }

  out.push_str("## Error Batch\n\n");
  for error in batch.errors() {
    out.push_str(&format!(
      "- `{}` {}:{} [{}] {}\n",
      error.code,
      error.location.file_path,
      error.location.line,
      error.severity,
      error.message
    ));
  }
  out.push('\n');

  for stage in Stage::ALL {
    let Some(finding) = findings.iter().find(|f| f.stage == stage) else { continue };
    out.push_str(&format!("## {} Findings\n\n", stage_title(stage)));
    out.push_str(&finding.summary);
    out.push_str("\n\n");
  }

  out.push_str("## Recommended Actions\n\n");
  if let Some(synth) = findings.iter().find(|f| f.stage == Stage::Synth) {
    if let Some(actions) = synth.details.get("recommended_actions").and_then(|v| v.as_array()) {
      for action in actions {
        if let Some(text) = action.as_str() {
          out.push_str(&format!("- {text}\n"));
        }
      }
    }
  }
  out.push('\n');

  out.push_str(&format!("## Confidence\n\n{confidence:.2}\n\n"));

  out.push_str("## Metadata\n\n");
  out.push_str(&format!("- Batch ID: {}\n", batch.batch_id));
  out.push_str(&format!("- Booklet ID: {booklet_id}\n"));
  out.push_str(&format!("- Generated: {}\n", generated_at.to_rfc3339()));
  if let Some(truncated_from) = batch.truncated_from {
    out.push_str(&format!("- Truncated from {truncated_from} diagnostics\n"));
  }

  out
}

fn render_failure(
  batch: Option<&ErrorBatch>,
  failed_stage: Option<Stage>,
  reason: &str,
  partial_findings: &[AIResearchFinding],
  booklet_id: Uuid,
  generated_at: chrono::DateTime<Utc>,
) -> String {
  let mut out = String::new();
  out.push_str("---\n");
  out.push_str(&format!("batch_id: {}\n", batch.map(|b| b.batch_id.to_string()).unwrap_or_default()));
  out.push_str(&format!("generated_at: {}\n", generated_at.to_rfc3339()));
  out.push_str(&format!("primary_error_code: {}\n", batch.map(|b| b.primary_error_code()).unwrap_or("UNPARSABLE")));
  out.push_str("confidence: 0.00\n");
  out.push_str("---\n\n");

  out.push_str("# Research Booklet: FAILED\n\n");
  out.push_str("## Failure\n\n");
  match failed_stage {
    Some(stage) => out.push_str(&format!("Stage **{}** failed: {reason}\n\n", stage_title(stage))),
    None => out.push_str(&format!("Parsing failed: {reason}\n\n")),
  }

  if let Some(batch) = batch {
    out.push_str("## Error Batch\n\n");
    for error in batch.errors() {
      out.push_str(&format!("- `{}` {}:{} [{}] {}\n", error.code, error.location.file_path, error.location.line, error.severity, error.message));
    }
    out.push('\n');
  }

  if !partial_findings.is_empty() {
    out.push_str("## Partial Findings\n\n");
    for finding in partial_findings {
      out.push_str(&format!("### {}\n\n", stage_title(finding.stage)));
      out.push_str(&finding.summary);
      out.push_str("\n\n");
    }
  }

  out.push_str("## Metadata\n\n");
  out.push_str(&format!("- Booklet ID: {booklet_id}\n"));
  out.push_str(&format!("- Generated: {}\n", generated_at.to_rfc3339()));
  out
}

fn stage_title(stage: Stage) -> &'static str {
  match stage {
    Stage::Docs => "Docs",
    Stage::Context => "Context",
    Stage::Pattern => "Pattern",
    Stage::Synth => "Synth",
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use aires_core::domain::{CompilerError, ErrorLocation, Severity};

  fn sample_batch() -> ErrorBatch {
    let error = CompilerError {
      code: "E0308".to_string(),
      message: "mismatched types".to_string(),
      severity: Severity::Error,
      location: ErrorLocation { file_path: "src/main.rs".to_string(), line: 10, column: Some(5) },
      raw_line: "error[E0308]: mismatched types".to_string(),
    };
    ErrorBatch::new("build.log", "abc123", vec![error], None).unwrap()
  }

  fn sample_finding(stage: Stage, batch_id: Uuid) -> AIResearchFinding {
    AIResearchFinding {
      stage,
      batch_id,
      produced_at: Utc::now(),
      confidence: 0.9,
      summary: format!("{stage} summary"),
      details: serde_json::Map::new(),
      raw_model_response: "{}".to_string(),
      model: "test-model".to_string(),
    }
  }

  #[tokio::test]
  async fn assembles_success_booklet_with_front_matter() {
    let dir = tempfile::tempdir().unwrap();
    let assembler = BookletAssembler::new(dir.path().to_path_buf());
    let batch = sample_batch();
    let findings: Vec<_> = Stage::ALL.iter().map(|s| sample_finding(*s, batch.batch_id)).collect();

    let booklet = assembler.assemble(&batch, &findings).await.unwrap();
    assert!(booklet.content.starts_with("---\n"));
    assert!(booklet.content.contains("E0308"));
    assert!(std::path::Path::new(&booklet.file_name).exists());
  }

  #[tokio::test]
  async fn assembles_failure_booklet_without_batch() {
    let dir = tempfile::tempdir().unwrap();
    let assembler = BookletAssembler::new(dir.path().to_path_buf());
    let booklet = assembler.assemble_failure(Uuid::now_v7(), None, None, "UNPARSABLE", &[]).await.unwrap();
    assert!(booklet.content.contains("Parsing failed"));
    assert!(booklet.file_name.contains("/failed/"));
  }
}
