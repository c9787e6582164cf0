//! Archive & DLQ (C11): moves input files out of the watch directory once
//! their record reaches a terminal state, and sweeps stale archive days.

use std::path::{Path, PathBuf};

use aires_core::{AiresError, Result};
use chrono::Utc;
use tracing::{info, warn};

pub struct Archive {
  input_directory: PathBuf,
  retention_days: u32,
}

impl Archive {
  pub fn new(input_directory: PathBuf, retention_days: u32) -> Self {
    Self { input_directory, retention_days }
  }

  fn today_dir(&self, bucket: &str) -> PathBuf {
    self.input_directory.join(bucket).join(Utc::now().format("%Y-%m-%d").to_string())
  }

  /// Moves a completed input file to `processed/YYYY-MM-DD/`.
  pub async fn move_to_processed(&self, file_name: &str) -> Result<PathBuf> {
    let dir = self.today_dir("processed");
    tokio::fs::create_dir_all(&dir).await.map_err(AiresError::Io)?;
    let dest = dir.join(Self::basename(file_name));
    self.move_file(file_name, &dest).await?;
    Ok(dest)
  }

  /// Moves a failed input file to `failed/YYYY-MM-DD/` and drops a sibling
  /// `.reason.txt` carrying the failure reason for operators to grep.
  pub async fn move_to_failed(&self, file_name: &str, reason: &str) -> Result<PathBuf> {
    let dir = self.today_dir("failed");
    tokio::fs::create_dir_all(&dir).await.map_err(AiresError::Io)?;
    let base = Self::basename(file_name);
    let dest = dir.join(&base);
    self.move_file(file_name, &dest).await?;
    let reason_path = dir.join(format!("{base}.reason.txt"));
    tokio::fs::write(&reason_path, reason).await.map_err(AiresError::Io)?;
    Ok(dest)
  }

  async fn move_file(&self, file_name: &str, dest: &Path) -> Result<()> {
    let source = self.resolve_source(file_name);
    match tokio::fs::rename(&source, dest).await {
      Ok(()) => Ok(()),
      // The watcher may have already moved or cleaned up a prior attempt;
      // a missing source is not an operational failure at this point.
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        warn!(file = %file_name, "archive source already gone, skipping move");
        Ok(())
      }
      Err(e) => Err(AiresError::Io(e)),
    }
  }

  /// The watcher records `FileProcessingRecord::file_name` as the full path
  /// it read the file from, which is usually already absolute; joining an
  /// absolute path onto `input_directory` would silently discard the
  /// directory (`Path::join`'s documented behavior), so an absolute
  /// `file_name` is used as-is and only a relative one is joined.
  fn resolve_source(&self, file_name: &str) -> PathBuf {
    let path = Path::new(file_name);
    if path.is_absolute() { path.to_path_buf() } else { self.input_directory.join(path) }
  }

  fn basename(file_name: &str) -> String {
    Path::new(file_name).file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| file_name.to_string())
  }

  /// Deletes archive day-directories older than `retentionDays`, under
  /// both `processed/` and `failed/`. Run once daily.
  pub async fn sweep(&self) -> Result<()> {
    for bucket in ["processed", "failed"] {
      self.sweep_bucket(bucket).await?;
    }
    Ok(())
  }

  async fn sweep_bucket(&self, bucket: &str) -> Result<()> {
    let dir = self.input_directory.join(bucket);
    let mut entries = match tokio::fs::read_dir(&dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
      Err(e) => return Err(AiresError::Io(e)),
    };
    let cutoff = Utc::now().date_naive() - chrono::Duration::days(self.retention_days as i64);

    while let Some(entry) = entries.next_entry().await.map_err(AiresError::Io)? {
      let name = entry.file_name();
      let Some(date) = name.to_str().and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()) else {
        continue;
      };
      if date < cutoff {
        info!(bucket, day = %name.to_string_lossy(), "retention sweep removing archive day");
        tokio::fs::remove_dir_all(entry.path()).await.map_err(AiresError::Io)?;
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn moves_completed_file_into_dated_processed_dir() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("build.log"), b"content").await.unwrap();
    let archive = Archive::new(dir.path().to_path_buf(), 30);

    let dest = archive.move_to_processed("build.log").await.unwrap();
    assert!(dest.exists());
    assert!(dest.to_string_lossy().contains("processed"));
  }

  #[tokio::test]
  async fn moves_failed_file_with_reason_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("bad.log"), b"garbage").await.unwrap();
    let archive = Archive::new(dir.path().to_path_buf(), 30);

    let dest = archive.move_to_failed("bad.log", "UNPARSABLE").await.unwrap();
    assert!(dest.exists());
    let reason = dest.with_file_name("bad.log.reason.txt");
    assert_eq!(tokio::fs::read_to_string(reason).await.unwrap(), "UNPARSABLE");
  }

  #[tokio::test]
  async fn sweep_removes_days_past_retention() {
    let dir = tempfile::tempdir().unwrap();
    let old_day = dir.path().join("processed").join("2000-01-01");
    tokio::fs::create_dir_all(&old_day).await.unwrap();
    let archive = Archive::new(dir.path().to_path_buf(), 30);

    archive.sweep().await.unwrap();
    assert!(!old_day.exists());
  }
}
