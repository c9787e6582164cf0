pub mod batches;
pub mod findings;
pub mod outbox;
pub mod records;
