//! Migration runner: version tracking, forward-only, one transaction per
//! migration.

mod v001_initial_schema;

use aires_core::{AiresError, Result};
use rusqlite::Connection;
use tracing::{debug, info, warn};

type MigrationFn = fn(&Connection) -> Result<()>;

const MIGRATIONS: [(u32, &str, MigrationFn); 1] =
  [(1, "initial_schema", v001_initial_schema::migrate)];

pub const LATEST_VERSION: u32 = 1;

pub fn current_version(conn: &Connection) -> Result<u32> {
  let exists: bool = conn
    .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version'")?
    .exists([])?;

  if !exists {
    return Ok(0);
  }

  let version: u32 =
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))?;

  Ok(version)
}

pub fn run_migrations(conn: &Connection) -> Result<u32> {
  let current = current_version(conn)?;
  let mut applied = 0;

  if current >= LATEST_VERSION {
    debug!("schema up to date (v{current})");
    return Ok(0);
  }

  info!("running migrations: v{} -> v{}", current, LATEST_VERSION);

  for &(version, name, migrate_fn) in &MIGRATIONS {
    if version <= current {
      continue;
    }

    conn.execute_batch("BEGIN IMMEDIATE")?;

    match migrate_fn(conn).and_then(|_| {
      conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
      Ok(())
    }) {
      Ok(()) => {
        conn.execute_batch("COMMIT")?;
        info!("applied migration v{version:03}: {name}");
        applied += 1;
      }
      Err(e) => {
        warn!("migration v{version:03} failed: {e}, rolling back");
        let _ = conn.execute_batch("ROLLBACK");
        return Err(AiresError::Infrastructure(format!(
          "migration v{version:03} ({name}) failed: {e}"
        )));
      }
    }
  }

  info!("applied {applied} migration(s), now at v{LATEST_VERSION}");
  Ok(applied)
}
