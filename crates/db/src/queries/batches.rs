use aires_core::domain::ErrorBatch;
use aires_core::{AiresError, Result};
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use crate::Store;

impl Store {
  pub async fn insert_batch(&self, batch: ErrorBatch) -> Result<()> {
    self.with_conn(move |conn| {
      let batch_json = serde_json::to_string(&batch)?;
      conn.execute(
        "INSERT INTO batch_sources \
        (batch_id, file_name, source_file, detected_at, checksum, primary_error_code, batch_json) \
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
          batch.batch_id.to_string(),
          std::path::Path::new(&batch.source_file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&batch.source_file),
          batch.source_file,
          batch.detected_at.to_rfc3339(),
          batch.checksum,
          batch.primary_error_code(),
          batch_json,
        ],
      )?;
      Ok(())
    })
    .await
  }

  pub async fn get_batch(&self, batch_id: Uuid) -> Result<Option<ErrorBatch>> {
    self.with_conn(move |conn| {
      let json: Option<String> = conn
        .query_row(
          "SELECT batch_json FROM batch_sources WHERE batch_id = ?1",
          params![batch_id.to_string()],
          |row| row.get(0),
        )
        .optional()?;
      match json {
        Some(json) => Ok(Some(serde_json::from_str(&json).map_err(AiresError::from)?)),
        None => Ok(None),
      }
    })
    .await
  }

  /// Resolves the owning `FileProcessingRecord`'s key for a batch, without
  /// paying for a full `ErrorBatch` deserialization. Used by the outbox
  /// publisher to mark a file `DeadLettered` when a message for its batch
  /// exhausts `maxPublishAttempts`.
  pub async fn file_name_for_batch(&self, batch_id: Uuid) -> Result<Option<String>> {
    self.with_conn(move |conn| {
      conn.query_row(
        "SELECT file_name FROM batch_sources WHERE batch_id = ?1",
        params![batch_id.to_string()],
        |row| row.get(0),
      )
      .optional()
      .map_err(AiresError::from)
    })
    .await
  }
}
