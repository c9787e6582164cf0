//! Watcher (C2): detects new input files and hands each to the parser
//! exactly once, even across crashes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use aires_core::domain::{FileState, OutboxMessage, Topic};
use aires_core::{AiresError, Result};
use aires_db::Store;
use glob::Pattern;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::activity::ActivityTracker;
use crate::lock::WatcherLock;
use crate::payload::ParseRequestedPayload;

#[derive(Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
  size: u64,
  modified: SystemTime,
}

struct Tracked {
  fingerprint: Fingerprint,
  since: Instant,
}

/// Polls `input_directory` for files matching `file_pattern`, claims each
/// one once it has been stable for `stable_for`, and hands it off to the
/// parser worker via the outbox.
pub struct Watcher {
  store: Store,
  input_directory: PathBuf,
  patterns: Vec<Pattern>,
  poll_interval: Duration,
  stable_for: Duration,
  tracked: HashMap<PathBuf, Tracked>,
  _lock: WatcherLock,
  draining: Arc<AtomicBool>,
  activity: Arc<ActivityTracker>,
}

impl Watcher {
  pub fn new(
    store: Store,
    input_directory: PathBuf,
    file_pattern: &[String],
    poll_interval: Duration,
    stable_for: Duration,
    draining: Arc<AtomicBool>,
    activity: Arc<ActivityTracker>,
  ) -> Result<Self> {
    if !input_directory.is_dir() {
      return Err(AiresError::Input(format!("input directory not readable: {}", input_directory.display())));
    }
    let lock = WatcherLock::acquire(&input_directory)?;
    let patterns = file_pattern
      .iter()
      .map(|p| Pattern::new(p).map_err(|e| AiresError::Config(format!("invalid filePattern {p}: {e}"))))
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      store,
      input_directory,
      patterns,
      poll_interval,
      stable_for,
      tracked: HashMap::new(),
      _lock: lock,
      draining,
      activity,
    })
  }

  /// Runs the poll loop until `shutdown` fires. Per the stop() contract,
  /// in-flight claims are already committed by the time a poll iteration
  /// returns, so there is nothing to flush on the way out.
  pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(self.poll_interval);
    info!(dir = %self.input_directory.display(), "watcher started");
    loop {
      tokio::select! {
        _ = interval.tick() => {
          if let Err(e) = self.poll_once().await {
            warn!("watcher poll failed: {e}");
          }
        }
        _ = shutdown.changed() => {
          if *shutdown.borrow() {
            break;
          }
        }
      }
    }
    info!("watcher stopped");
  }

  async fn poll_once(&mut self) -> Result<()> {
    self.activity.touch("watcher");
    if self.draining.load(Ordering::Relaxed) {
      return Ok(());
    }
    let mut seen = Vec::new();
    for entry in std::fs::read_dir(&self.input_directory).map_err(AiresError::Io)? {
      let entry = entry.map_err(AiresError::Io)?;
      let path = entry.path();
      if !path.is_file() || !self.matches_pattern(&path) {
        continue;
      }
      seen.push(path);
    }

    for path in seen {
      let metadata = match std::fs::metadata(&path) {
        Ok(m) => m,
        Err(e) => {
          warn!(path = %path.display(), "failed to stat candidate: {e}");
          continue;
        }
      };
      let fingerprint =
        Fingerprint { size: metadata.len(), modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH) };

      let is_stable = match self.tracked.get(&path) {
        Some(tracked) if tracked.fingerprint == fingerprint => tracked.since.elapsed() >= self.stable_for,
        _ => {
          self.tracked.insert(path.clone(), Tracked { fingerprint, since: Instant::now() });
          false
        }
      };

      if is_stable {
        self.tracked.remove(&path);
        if let Err(e) = self.try_claim(&path).await {
          warn!(path = %path.display(), "claim failed: {e}");
        }
      }
    }
    Ok(())
  }

  fn matches_pattern(&self, path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else { return false };
    if name == ".aires.lock" {
      return false;
    }
    self.patterns.iter().any(|p| p.matches(name))
  }

  /// Claims a stable file, versioning the name if a prior record for it
  /// exists in a terminal state with a different checksum (rule 5).
  async fn try_claim(&self, path: &Path) -> Result<()> {
    let content = std::fs::read(path).map_err(AiresError::Io)?;
    let checksum = checksum_of(&content);
    let file_name = path.to_string_lossy().to_string();

    let target_name = match self.store.get_record(file_name.clone()).await? {
      Some(existing) if existing.state.is_terminal() && existing.checksum != checksum => {
        self.store.next_version_name(file_name.clone()).await?
      }
      _ => file_name,
    };

    let Some(_record) = self.store.claim_file(target_name.clone(), checksum).await? else {
      debug!(file = %target_name, "already claimed, skipping");
      return Ok(());
    };

    let pending_id = Uuid::now_v7();
    let payload = ParseRequestedPayload { pending_id, file_name: target_name.clone(), file_path: path.to_path_buf() };
    let message = OutboxMessage::new(pending_id, Topic::ParseRequested, serde_json::to_vec(&payload)?);
    self.store.insert_outbox_message(message).await?;
    self.store.transition_record(target_name.clone(), FileState::Parsing, None, None).await?;
    info!(file = %target_name, "claimed file for parsing");
    Ok(())
  }
}

fn checksum_of(content: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(content);
  format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn claims_a_stable_matching_file() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("build.log");
    std::fs::write(&file_path, b"error: boom").unwrap();

    let store = Store::open_in_memory().await.unwrap();
    let mut watcher = Watcher::new(
      store.clone(),
      dir.path().to_path_buf(),
      &["*.log".to_string()],
      Duration::from_millis(10),
      Duration::from_millis(0),
      Arc::new(AtomicBool::new(false)),
      Arc::new(ActivityTracker::new()),
    )
    .unwrap();

    watcher.poll_once().await.unwrap();
    watcher.poll_once().await.unwrap();

    let record = store.get_record(file_path.to_string_lossy().to_string()).await.unwrap();
    assert!(record.is_some());
    assert_eq!(record.unwrap().state, FileState::Parsing);
  }

  #[tokio::test]
  async fn ignores_files_that_do_not_match_pattern() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.md"), b"hello").unwrap();

    let store = Store::open_in_memory().await.unwrap();
    let mut watcher = Watcher::new(
      store.clone(),
      dir.path().to_path_buf(),
      &["*.log".to_string()],
      Duration::from_millis(10),
      Duration::from_millis(0),
      Arc::new(AtomicBool::new(false)),
      Arc::new(ActivityTracker::new()),
    )
    .unwrap();

    watcher.poll_once().await.unwrap();
    watcher.poll_once().await.unwrap();

    assert!(store.count_by_state().await.unwrap().is_empty());
  }
}
