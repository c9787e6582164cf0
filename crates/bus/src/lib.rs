//! In-process, partitioned topic bus plus the outbox publisher that feeds
//! it from durable `outbox_messages` rows.
//!
//! The bus itself is not the durability boundary: the outbox table is.
//! Messages are delivered to the bus only after the publisher has read
//! them from the table, so a process restart never loses a message, only
//! delays its delivery.

mod partitions;
mod publisher;

pub use partitions::{BusHandle, PartitionKey, SharedReceiver};
pub use publisher::{OutboxPublisher, PublisherConfig};
