//! Relational state store backing `FileProcessingRecord`, `OutboxMessage`
//! and `findings`. Single write connection; callers serialize through
//! `Store`'s blocking-task boundary rather than holding a connection pool.

mod connection;
mod migrations;
pub mod queries;

pub use connection::Store;
