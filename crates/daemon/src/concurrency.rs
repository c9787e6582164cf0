//! Bounds inter-batch parallelism at `maxConcurrentBatches` (§5). A permit
//! is acquired once a batch enters the pipeline (parser worker) and
//! released once it reaches a terminal state (orchestrator), so the gate's
//! lifetime matches the batch's, not any single component's.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

pub struct ConcurrencyGate {
  semaphore: Arc<Semaphore>,
  permits: Mutex<HashMap<Uuid, OwnedSemaphorePermit>>,
}

impl ConcurrencyGate {
  pub fn new(max_concurrent_batches: usize) -> Self {
    Self { semaphore: Arc::new(Semaphore::new(max_concurrent_batches)), permits: Mutex::new(HashMap::new()) }
  }

  /// Blocks until a slot is free, then holds it against `batch_id`.
  pub async fn acquire(&self, batch_id: Uuid) {
    let permit = self.semaphore.clone().acquire_owned().await.expect("concurrency semaphore never closes");
    self.permits.lock().expect("concurrency gate mutex poisoned").insert(batch_id, permit);
  }

  /// Frees the slot held for `batch_id`, if any. Safe to call more than
  /// once or for a batch that never acquired a permit.
  pub fn release(&self, batch_id: Uuid) {
    self.permits.lock().expect("concurrency gate mutex poisoned").remove(&batch_id);
  }

  pub fn in_flight(&self) -> usize {
    self.permits.lock().expect("concurrency gate mutex poisoned").len()
  }
}
