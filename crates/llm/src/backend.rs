use async_trait::async_trait;
use dyn_clone::DynClone;

use aires_core::AiresError;

/// One call to a backend: everything `AiClient` resolved from the stage's
/// config plus the composed prompt text. `response_format_json` is always
/// true in this pipeline but kept explicit since it's part of the wire
/// contract with the backend.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
  pub model: String,
  pub system_prompt: String,
  pub prompt: String,
  pub temperature: f32,
  pub max_tokens: u32,
  pub response_format_json: bool,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
  pub text: String,
}

/// A backend that can turn a prompt into structured-JSON model output.
/// Implementations own their own HTTP client and endpoint configuration;
/// `AiClient` owns retrying, rate limiting and deadline enforcement above
/// this trait, not below it.
#[async_trait]
pub trait LlmBackend: Send + Sync + DynClone {
  fn name(&self) -> &str;

  async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, AiresError>;
}

dyn_clone::clone_trait_object!(LlmBackend);
