use aires_core::domain::{FileProcessingRecord, FileState};
use aires_core::{AiresError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};

use crate::Store;

fn row_to_record(row: &Row) -> rusqlite::Result<FileProcessingRecord> {
  let state_str: String = row.get("state")?;
  let state = state_str.parse::<FileState>().map_err(|e| {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(std::io::Error::other(e)))
  })?;

  Ok(FileProcessingRecord {
    file_name: row.get("file_name")?,
    checksum: row.get("checksum")?,
    state,
    detected_at: row.get::<_, String>("detected_at")?.parse().unwrap_or_else(|_| Utc::now()),
    claimed_at: parse_opt_timestamp(row, "claimed_at")?,
    completed_at: parse_opt_timestamp(row, "completed_at")?,
    attempts: row.get::<_, i64>("attempts")? as u32,
    last_error: row.get("last_error")?,
    booklet_path: row.get("booklet_path")?,
  })
}

fn parse_opt_timestamp(row: &Row, column: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
  let raw: Option<String> = row.get(column)?;
  Ok(raw.and_then(|s| s.parse().ok()))
}

const SELECT_RECORD: &str = "SELECT file_name, checksum, state, detected_at, claimed_at, \
  completed_at, attempts, last_error, booklet_path FROM file_processing_records WHERE file_name = ?1";

impl Store {
  /// Attempts to claim `file_name` for processing. Returns `Ok(Some(record))`
  /// on a fresh claim, `Ok(None)` if a record for this file name already
  /// exists (duplicate detection, per §8's idempotence law).
  pub async fn claim_file(&self, file_name: String, checksum: String) -> Result<Option<FileProcessingRecord>> {
    self.with_conn(move |conn| {
      let mut record = FileProcessingRecord::new(file_name.clone(), checksum.clone());
      record.transition(FileState::Claimed);

      let inserted = conn.execute(
        "INSERT OR IGNORE INTO file_processing_records \
        (file_name, checksum, state, detected_at, claimed_at, attempts) \
        VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        params![
          record.file_name,
          record.checksum,
          record.state.as_str(),
          record.detected_at.to_rfc3339(),
          record.claimed_at.map(|t| t.to_rfc3339()),
        ],
      )?;

      if inserted == 0 {
        return Ok(None);
      }
      Ok(Some(record))
    })
    .await
  }

  /// Re-detection with a changed checksum: versions the file name by
  /// appending `.v2`, `.v3`, ... to the lowest unused suffix, per §4.1
  /// rule 5.
  pub async fn next_version_name(&self, file_name: String) -> Result<String> {
    self.with_conn(move |conn| {
      let mut n = 2;
      loop {
        let candidate = format!("{file_name}.v{n}");
        let exists: bool = conn
          .prepare("SELECT 1 FROM file_processing_records WHERE file_name = ?1")?
          .exists(params![candidate])?;
        if !exists {
          return Ok(candidate);
        }
        n += 1;
      }
    })
    .await
  }

  pub async fn get_record(&self, file_name: String) -> Result<Option<FileProcessingRecord>> {
    self.with_conn(move |conn| {
      conn.query_row(SELECT_RECORD, params![file_name], |row| row_to_record(row))
        .optional()
        .map_err(AiresError::from)
    })
    .await
  }

  /// Applies a state transition, persisting the new state plus any
  /// side-fields. Panics (via `FileProcessingRecord::transition`) on an
  /// illegal edge rather than silently accepting it.
  pub async fn transition_record(
    &self,
    file_name: String,
    next: FileState,
    last_error: Option<String>,
    booklet_path: Option<String>,
  ) -> Result<()> {
    self.with_conn(move |conn| {
      let mut record = conn
        .query_row(SELECT_RECORD, params![file_name], |row| row_to_record(row))
        .map_err(AiresError::from)?;

      record.transition(next);
      if last_error.is_some() {
        record.last_error = last_error;
      }
      if booklet_path.is_some() {
        record.booklet_path = booklet_path;
      }

      conn.execute(
        "UPDATE file_processing_records SET state = ?1, claimed_at = ?2, \
        completed_at = ?3, last_error = ?4, booklet_path = ?5 WHERE file_name = ?6",
        params![
          record.state.as_str(),
          record.claimed_at.map(|t| t.to_rfc3339()),
          record.completed_at.map(|t| t.to_rfc3339()),
          record.last_error,
          record.booklet_path,
          record.file_name,
        ],
      )?;
      Ok(())
    })
    .await
  }

  pub async fn increment_attempts(&self, file_name: String) -> Result<u32> {
    self.with_conn(move |conn| {
      conn.execute(
        "UPDATE file_processing_records SET attempts = attempts + 1 WHERE file_name = ?1",
        params![file_name],
      )?;
      let attempts: i64 = conn.query_row(
        "SELECT attempts FROM file_processing_records WHERE file_name = ?1",
        params![file_name],
        |row| row.get(0),
      )?;
      Ok(attempts as u32)
    })
    .await
  }

  pub async fn count_by_state(&self) -> Result<Vec<(FileState, i64)>> {
    self.with_conn(|conn| {
      let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM file_processing_records GROUP BY state")?;
      let rows = stmt.query_map([], |row| {
        let state_str: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok((state_str, count))
      })?;
      let mut out = Vec::new();
      for row in rows {
        let (state_str, count) = row?;
        if let Ok(state) = state_str.parse::<FileState>() {
          out.push((state, count));
        }
      }
      Ok(out)
    })
    .await
  }

  /// Records first detected since local midnight UTC, for the status
  /// surface's `filesDetectedToday`.
  pub async fn count_detected_today(&self) -> Result<u64> {
    self.with_conn(|conn| {
      let since = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap_or_default().and_utc().to_rfc3339();
      let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM file_processing_records WHERE detected_at >= ?1",
        params![since],
        |row| row.get(0),
      )?;
      Ok(count as u64)
    })
    .await
  }

  /// The most recent `last_error` across all records, surfaced as
  /// `StatusResult::last_error` for quick at-a-glance diagnosis.
  pub async fn most_recent_error(&self) -> Result<Option<String>> {
    self.with_conn(|conn| {
      conn.query_row(
        "SELECT last_error FROM file_processing_records WHERE last_error IS NOT NULL \
        ORDER BY COALESCE(completed_at, detected_at) DESC LIMIT 1",
        [],
        |row| row.get(0),
      )
      .optional()
      .map_err(AiresError::from)
    })
    .await
  }
}
