use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use aires_core::{AiresError, Result};
use rusqlite::Connection;

use crate::migrations;

/// Owns the single write connection to the SQLite state store.
///
/// Every call runs the actual SQLite work on a blocking thread
/// (`spawn_blocking`) since `rusqlite` is synchronous; the connection
/// itself is guarded by a plain `std::sync::Mutex` because the critical
/// sections never cross an `.await`.
#[derive(Clone)]
pub struct Store {
  conn: Arc<Mutex<Connection>>,
}

impl Store {
  pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
    let path = path.into();
    let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
      let conn = Connection::open(&path)?;
      conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
      migrations::run_migrations(&conn)?;
      Ok(conn)
    })
    .await
    .map_err(|e| AiresError::Infrastructure(format!("store open task panicked: {e}")))??;

    Ok(Self { conn: Arc::new(Mutex::new(conn)) })
  }

  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio::task::spawn_blocking(|| -> Result<Connection> {
      let conn = Connection::open_in_memory()?;
      conn.execute_batch("PRAGMA foreign_keys=ON;")?;
      migrations::run_migrations(&conn)?;
      Ok(conn)
    })
    .await
    .map_err(|e| AiresError::Infrastructure(format!("store open task panicked: {e}")))??;

    Ok(Self { conn: Arc::new(Mutex::new(conn)) })
  }

  /// Runs `f` against the connection on a blocking thread. Every query
  /// module function is built on top of this so no caller ever touches
  /// a `rusqlite::Connection` directly from async code.
  pub(crate) async fn with_conn<F, T>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let conn = self.conn.clone();
    tokio::task::spawn_blocking(move || {
      let conn = conn.lock().expect("store connection mutex poisoned");
      f(&conn)
    })
    .await
    .map_err(|e| AiresError::Infrastructure(format!("store task panicked: {e}")))?
  }

  /// Cheapest possible liveness probe, used by the health surface.
  pub async fn ping(&self) -> Result<()> {
    self.with_conn(|conn| {
      conn.query_row("SELECT 1", [], |_row| Ok(()))?;
      Ok(())
    })
    .await
  }
}
