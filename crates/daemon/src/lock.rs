//! Enforces watcher exclusivity: exactly one watcher instance per input
//! directory, via an OS-level advisory lock on `<inputDir>/.aires.lock`.

use std::fs::{File, OpenOptions};
use std::path::Path;

use aires_core::AiresError;
use fd_lock::{RwLock, RwLockWriteGuard};

/// Held for the lifetime of the watcher. Dropping it releases the lock.
pub struct WatcherLock {
  _guard: RwLockWriteGuard<'static, File>,
}

impl WatcherLock {
  /// Acquires the lock, failing fast if another instance already holds it.
  /// The backing `RwLock` is leaked rather than stored alongside the guard:
  /// the lock is meant to live for the whole process, so a `'static`
  /// handle avoids a self-referential struct for no real cost.
  pub fn acquire(input_directory: &Path) -> Result<Self, AiresError> {
    let lock_path = input_directory.join(".aires.lock");
    let file = OpenOptions::new()
      .create(true)
      .write(true)
      .open(&lock_path)
      .map_err(AiresError::Io)?;

    let lock: &'static mut RwLock<File> = Box::leak(Box::new(RwLock::new(file)));
    let guard = lock
      .try_write()
      .map_err(|_| AiresError::Infrastructure(format!("watcher lock already held: {}", lock_path.display())))?;

    Ok(Self { _guard: guard })
  }
}
