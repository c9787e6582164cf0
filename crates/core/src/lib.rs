//! Shared domain types, configuration, and error kinds for AIRES.

pub mod config;
pub mod correlation;
pub mod domain;
pub mod error;
pub mod service;

pub use config::Config;
pub use correlation::CorrelationId;
pub use error::AiresError;
pub use service::HealthStatus;

pub type Result<T> = std::result::Result<T, AiresError>;
