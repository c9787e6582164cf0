use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use aires_core::domain::{OutboxMessage, Stage, Topic};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

/// Key used to route a message to its topic channel. The outbox message
/// already carries `batch_id`; a topic's receiver is shared by a pool of
/// workers rather than partitioned per batch, since `mpsc` delivery order
/// combined with the idempotent, state-checked handling in each worker is
/// enough to keep a batch's own messages processed in order even when
/// other batches interleave. `PartitionKey` is kept as a distinct type so
/// a future true per-batch partition has something to shard on.
pub type PartitionKey = (Topic, uuid::Uuid);

const CHANNEL_CAPACITY: usize = 256;

/// A topic's receiving end, shared across a pool of worker tasks. Each
/// worker locks the mutex only to pull the next message off, then drops
/// the guard before processing it, so many workers can drain one topic
/// concurrently without serializing on each other's work.
pub type SharedReceiver = Arc<AsyncMutex<mpsc::Receiver<OutboxMessage>>>;

/// The in-process bus. One `mpsc` channel per topic; producers (stage
/// workers, the watcher, the outbox publisher) send into it, and a pool of
/// worker tasks (sized to `maxConcurrentBatches`) shares its receiver, so
/// different batches progress through a stage in parallel instead of
/// strictly one at a time.
pub struct BusHandle {
  senders: HashMap<String, mpsc::Sender<OutboxMessage>>,
  receivers: Mutex<HashMap<String, SharedReceiver>>,
}

impl BusHandle {
  pub fn new() -> Self {
    let mut senders = HashMap::new();
    let mut receivers = HashMap::new();

    for topic in Self::all_topics() {
      let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
      senders.insert(topic.as_str(), tx);
      receivers.insert(topic.as_str(), Arc::new(AsyncMutex::new(rx)));
    }

    Self { senders, receivers: Mutex::new(receivers) }
  }

  fn all_topics() -> Vec<Topic> {
    let mut topics = vec![Topic::ParseRequested, Topic::ParseCompleted, Topic::BookletRequested, Topic::DeadLetter];
    for stage in Stage::ALL {
      topics.push(Topic::StageInput(stage));
      topics.push(Topic::StageOutput(stage));
    }
    topics
  }

  pub async fn publish(&self, topic: Topic, message: OutboxMessage) -> Result<(), mpsc::error::SendError<OutboxMessage>> {
    let sender = self.senders.get(&topic.as_str()).expect("unknown topic");
    sender.send(message).await
  }

  /// Takes ownership of a topic's shared receiver. Each topic may only be
  /// subscribed once; a second call panics. Clone the returned `Arc` once
  /// per worker in the pool that will drain this topic.
  pub fn subscribe(&self, topic: Topic) -> SharedReceiver {
    self.receivers
      .lock()
      .expect("bus receivers mutex poisoned")
      .remove(&topic.as_str())
      .unwrap_or_else(|| panic!("topic {} already subscribed", topic.as_str()))
  }
}

impl Default for BusHandle {
  fn default() -> Self {
    Self::new()
  }
}
