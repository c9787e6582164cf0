use aires_core::domain::{AIResearchFinding, OutboxMessage, Topic};
use aires_core::{AiresError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use uuid::Uuid;

use crate::Store;

fn row_to_message(row: &Row) -> rusqlite::Result<OutboxMessage> {
  let topic_str: String = row.get("topic")?;
  let topic = parse_topic(&topic_str).map_err(|e| {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(std::io::Error::other(e)))
  })?;
  let batch_id: String = row.get("batch_id")?;
  let message_id: String = row.get("message_id")?;

  Ok(OutboxMessage {
    message_id: message_id.parse().unwrap_or_default(),
    batch_id: batch_id.parse().unwrap_or_default(),
    topic,
    payload: row.get("payload")?,
    created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
    published_at: row
      .get::<_, Option<String>>("published_at")?
      .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
    attempts: row.get::<_, i64>("attempts")? as u32,
    next_attempt_at: row.get::<_, String>("next_attempt_at")?.parse().unwrap_or_else(|_| Utc::now()),
  })
}

fn parse_topic(s: &str) -> std::result::Result<Topic, String> {
  use aires_core::domain::Stage;
  match s {
    "parse.requested" => Ok(Topic::ParseRequested),
    "parse.completed" => Ok(Topic::ParseCompleted),
    "booklet.requested" => Ok(Topic::BookletRequested),
    "dead.letter" => Ok(Topic::DeadLetter),
    other => {
      if let Some(stage_str) = other.strip_suffix(".input") {
        return Ok(Topic::StageInput(stage_str.parse::<Stage>()?));
      }
      if let Some(stage_str) = other.strip_suffix(".output") {
        return Ok(Topic::StageOutput(stage_str.parse::<Stage>()?));
      }
      Err(format!("unknown topic: {other}"))
    }
  }
}

impl Store {
  /// Inserts an outbox row. Callers that need the outbox-consistency
  /// invariant (§3, §8 property 3) should use
  /// [`Store::insert_finding_and_publish`] instead, which does this in
  /// the same transaction as the finding insert.
  pub async fn insert_outbox_message(&self, message: OutboxMessage) -> Result<()> {
    self.with_conn(move |conn| {
      conn.execute(
        "INSERT INTO outbox_messages \
        (message_id, batch_id, topic, payload, created_at, published_at, attempts, next_attempt_at) \
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
          message.message_id.to_string(),
          message.batch_id.to_string(),
          message.topic.as_str(),
          message.payload,
          message.created_at.to_rfc3339(),
          message.published_at.map(|t| t.to_rfc3339()),
          message.attempts,
          message.next_attempt_at.to_rfc3339(),
        ],
      )?;
      Ok(())
    })
    .await
  }

  /// Persists a stage finding and the outbox message that advances the
  /// batch to the next stage (or to `booklet.requested`) in a single
  /// transaction, so that "finding exists" and "outbox row exists" can
  /// never disagree (the outbox-consistency property).
  pub async fn insert_finding_and_publish(
    &self,
    finding: AIResearchFinding,
    message: OutboxMessage,
  ) -> Result<()> {
    self.with_conn(move |conn| {
      let tx = conn.unchecked_transaction()?;
      let details_json = serde_json::to_string(&finding.details)?;
      tx.execute(
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
      tx.execute(
        "INSERT INTO outbox_messages \
        (message_id, batch_id, topic, payload, created_at, published_at, attempts, next_attempt_at) \
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
          message.message_id.to_string(),
          message.batch_id.to_string(),
          message.topic.as_str(),
          message.payload,
          message.created_at.to_rfc3339(),
          message.published_at.map(|t| t.to_rfc3339()),
          message.attempts,
          message.next_attempt_at.to_rfc3339(),
        ],
      )?;
      tx.commit()?;
      Ok(())
    })
    .await
  }

  /// Rows the publisher should attempt now: unpublished, due for retry,
  /// oldest first (creation order).
  pub async fn list_unpublished(&self, limit: usize) -> Result<Vec<OutboxMessage>> {
    self.with_conn(move |conn| {
      let mut stmt = conn.prepare(
        "SELECT message_id, batch_id, topic, payload, created_at, published_at, \
        attempts, next_attempt_at FROM outbox_messages \
        WHERE published_at IS NULL AND next_attempt_at <= ?1 \
        ORDER BY created_at ASC LIMIT ?2",
      )?;
      let now = Utc::now().to_rfc3339();
      let rows = stmt.query_map(params![now, limit as i64], |row| row_to_message(row))?;
      rows.collect::<rusqlite::Result<_>>().map_err(AiresError::from)
    })
    .await
  }

  pub async fn mark_published(&self, message_id: Uuid) -> Result<()> {
    self.with_conn(move |conn| {
      conn.execute(
        "UPDATE outbox_messages SET published_at = ?1 WHERE message_id = ?2",
        params![Utc::now().to_rfc3339(), message_id.to_string()],
      )?;
      Ok(())
    })
    .await
  }

  /// Records a failed publish attempt and schedules the next one with
  /// the given backoff delay. Returns the attempt count after this
  /// failure so the caller can compare against `maxPublishAttempts`.
  pub async fn record_publish_failure(&self, message_id: Uuid, next_attempt_at: DateTime<Utc>) -> Result<u32> {
    self.with_conn(move |conn| {
      conn.execute(
        "UPDATE outbox_messages SET attempts = attempts + 1, next_attempt_at = ?1 WHERE message_id = ?2",
        params![next_attempt_at.to_rfc3339(), message_id.to_string()],
      )?;
      let attempts: i64 = conn.query_row(
        "SELECT attempts FROM outbox_messages WHERE message_id = ?1",
        params![message_id.to_string()],
        |row| row.get(0),
      )?;
      Ok(attempts as u32)
    })
    .await
  }

  /// Unpublished outbox rows grouped by topic, used by the status and
  /// metrics surfaces as a proxy for per-stage queue depth.
  pub async fn count_pending_by_topic(&self) -> Result<Vec<(Topic, i64)>> {
    self.with_conn(|conn| {
      let mut stmt = conn.prepare(
        "SELECT topic, COUNT(*) FROM outbox_messages WHERE published_at IS NULL GROUP BY topic",
      )?;
      let rows = stmt.query_map([], |row| {
        let topic_str: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok((topic_str, count))
      })?;
      let mut out = Vec::new();
      for row in rows {
        let (topic_str, count) = row?;
        if let Ok(topic) = parse_topic(&topic_str) {
          out.push((topic, count));
        }
      }
      Ok(out)
    })
    .await
  }

  /// Moves a message to `dead.letter` after exhausting `maxPublishAttempts`.
  pub async fn dead_letter(&self, message_id: Uuid) -> Result<()> {
    self.with_conn(move |conn| {
      conn.execute(
        "UPDATE outbox_messages SET topic = ?1, published_at = ?2 WHERE message_id = ?3",
        params![Topic::DeadLetter.as_str(), Utc::now().to_rfc3339(), message_id.to_string()],
      )?;
      Ok(())
    })
    .await
  }
}
