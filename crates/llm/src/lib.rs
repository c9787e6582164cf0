//! Uniform call surface over heterogeneous LLM backends: `AiClient::analyze`
//! takes a stage, a composed prompt and the stage's config, and returns a
//! typed `AIResearchFinding` or an `AiresError`, with timeouts and
//! per-backend rate limiting handled uniformly regardless of which backend
//! answered. `analyze` makes exactly one call attempt — retrying a
//! transient failure is the stage worker's job (`crates/daemon/src/stage.rs`),
//! since only it can persist `attempts` durably in the outbox and survive a
//! crash mid-retry; a second, client-internal retry loop would double-count
//! against `maxStageAttempts`.

mod backend;
mod client;
mod cloud_http;
mod local_http;
mod prompt;
mod rate_limit;

pub use backend::{CompletionRequest, CompletionResponse, LlmBackend};
pub use client::AiClient;
pub use cloud_http::CloudHttpProvider;
pub use local_http::LocalHttpProvider;
pub use prompt::compose_prompt;
pub use rate_limit::{RateLimitConfig, TokenBucket};
