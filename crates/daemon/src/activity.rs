//! Per-component activity tracking, feeding the health surface (C10).
//!
//! Unlike the idle-shutdown tracker this is adapted from, AIRES's daemon
//! runs persistently: there is no auto-shutdown behavior here, only a
//! record of when each component last did something, used to tell a
//! genuinely stuck component from a merely quiet one.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};

pub struct ActivityTracker {
  started_at: Instant,
  last_activity: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ActivityTracker {
  pub fn new() -> Self {
    Self { started_at: Instant::now(), last_activity: Mutex::new(HashMap::new()) }
  }

  pub fn touch(&self, component: &str) {
    self
      .last_activity
      .lock()
      .expect("activity tracker mutex poisoned")
      .insert(component.to_string(), Utc::now());
  }

  pub fn last_activity(&self, component: &str) -> Option<DateTime<Utc>> {
    self.last_activity.lock().expect("activity tracker mutex poisoned").get(component).copied()
  }

  pub fn uptime_seconds(&self) -> u64 {
    self.started_at.elapsed().as_secs()
  }
}

impl Default for ActivityTracker {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn touch_records_component_activity() {
    let tracker = ActivityTracker::new();
    assert!(tracker.last_activity("watcher").is_none());
    tracker.touch("watcher");
    assert!(tracker.last_activity("watcher").is_some());
  }
}
