use aires_core::domain::{AIResearchFinding, Stage};
use aires_core::{AiresError, Result};
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

use crate::Store;

fn row_to_finding(row: &Row) -> rusqlite::Result<AIResearchFinding> {
  let stage_str: String = row.get("stage")?;
  let stage = stage_str.parse::<Stage>().map_err(|e| {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(std::io::Error::other(e)))
  })?;
  let batch_id: String = row.get("batch_id")?;
  let details_json: String = row.get("details_json")?;
  let details = serde_json::from_str(&details_json).unwrap_or_default();

  Ok(AIResearchFinding {
    stage,
    batch_id: batch_id.parse().unwrap_or_default(),
    produced_at: row.get::<_, String>("produced_at")?.parse().unwrap_or_else(|_| chrono::Utc::now()),
    confidence: row.get("confidence")?,
    summary: row.get("summary")?,
    details,
    raw_model_response: row.get("raw_response")?,
    model: row.get("model")?,
  })
}

impl Store {
  /// Idempotent insert keyed by `(batch_id, stage)`: re-delivering a stage
  /// message whose finding already exists is a no-op, per §8.
  pub async fn insert_finding(&self, finding: AIResearchFinding) -> Result<bool> {
    self.with_conn(move |conn| {
      let details_json = serde_json::to_string(&finding.details)?;
      let inserted = conn.execute(
        "INSERT OR IGNORE INTO findings \
        (batch_id, stage, produced_at, confidence, summary, details_json, raw_response, model) \
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
          finding.batch_id.to_string(),
          finding.stage.as_str(),
          finding.produced_at.to_rfc3339(),
          finding.confidence,
          finding.summary,
          details_json,
          finding.raw_model_response,
          finding.model,
        ],
      )?;
      Ok(inserted > 0)
    })
    .await
  }

  pub async fn get_finding(&self, batch_id: Uuid, stage: Stage) -> Result<Option<AIResearchFinding>> {
    self.with_conn(move |conn| {
      conn.query_row(
        "SELECT batch_id, stage, produced_at, confidence, summary, details_json, \
        raw_response, model FROM findings WHERE batch_id = ?1 AND stage = ?2",
        params![batch_id.to_string(), stage.as_str()],
        |row| row_to_finding(row),
      )
      .optional()
      .map_err(AiresError::from)
    })
    .await
  }

  /// All findings for a batch, in stage order. Used by the orchestrator
  /// to confirm all four stages completed before assembling a booklet.
  pub async fn findings_for_batch(&self, batch_id: Uuid) -> Result<Vec<AIResearchFinding>> {
    self.with_conn(move |conn| {
      let mut stmt = conn.prepare(
        "SELECT batch_id, stage, produced_at, confidence, summary, details_json, \
        raw_response, model FROM findings WHERE batch_id = ?1",
      )?;
      let rows = stmt.query_map(params![batch_id.to_string()], |row| row_to_finding(row))?;
      let mut findings: Vec<AIResearchFinding> = rows.collect::<rusqlite::Result<_>>()?;
      findings.sort_by_key(|f| f.stage.index());
      Ok(findings)
    })
    .await
  }
}
