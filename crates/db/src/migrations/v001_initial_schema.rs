use aires_core::Result;
use rusqlite::Connection;

pub fn migrate(conn: &Connection) -> Result<()> {
  conn.execute_batch(
    "CREATE TABLE schema_version (
      version INTEGER PRIMARY KEY,
      applied_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE file_processing_records (
      file_name TEXT PRIMARY KEY,
      checksum TEXT NOT NULL,
      state TEXT NOT NULL,
      detected_at TEXT NOT NULL,
      claimed_at TEXT,
      completed_at TEXT,
      attempts INTEGER NOT NULL DEFAULT 0,
      last_error TEXT,
      booklet_path TEXT
    );

    CREATE INDEX idx_file_processing_records_state
      ON file_processing_records(state);

    CREATE TABLE outbox_messages (
      message_id TEXT PRIMARY KEY,
      batch_id TEXT NOT NULL,
      topic TEXT NOT NULL,
      payload BLOB NOT NULL,
      created_at TEXT NOT NULL,
      published_at TEXT,
      attempts INTEGER NOT NULL DEFAULT 0,
      next_attempt_at TEXT NOT NULL
    );

    CREATE INDEX idx_outbox_messages_publish_scan
      ON outbox_messages(published_at, next_attempt_at);

    CREATE TABLE findings (
      batch_id TEXT NOT NULL,
      stage TEXT NOT NULL,
      produced_at TEXT NOT NULL,
      confidence REAL NOT NULL,
      summary TEXT NOT NULL,
      details_json TEXT NOT NULL,
      raw_response TEXT NOT NULL,
      model TEXT NOT NULL,
      PRIMARY KEY (batch_id, stage)
    );

    CREATE TABLE batch_sources (
      batch_id TEXT PRIMARY KEY,
      file_name TEXT NOT NULL,
      source_file TEXT NOT NULL,
      detected_at TEXT NOT NULL,
      checksum TEXT NOT NULL,
      primary_error_code TEXT NOT NULL,
      batch_json TEXT NOT NULL
    );",
  )?;
  Ok(())
}
