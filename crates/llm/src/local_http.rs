use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use aires_core::AiresError;

use crate::backend::{CompletionRequest, CompletionResponse, LlmBackend};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// `localHTTP` backend: a locally-hosted model server speaking Ollama's
/// `/api/generate` contract. No API key; availability is the only concern.
#[derive(Debug, Clone)]
pub struct LocalHttpProvider {
  client: reqwest::Client,
  base_url: String,
}

impl LocalHttpProvider {
  pub fn new() -> Self {
    Self { client: reqwest::Client::new(), base_url: DEFAULT_BASE_URL.to_string() }
  }

  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = base_url.into();
    self
  }

  fn generate_url(&self) -> String {
    format!("{}/api/generate", self.base_url)
  }
}

impl Default for LocalHttpProvider {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
  model: &'a str,
  system: &'a str,
  prompt: &'a str,
  stream: bool,
  format: &'a str,
  options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
  temperature: f32,
  num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
  response: String,
}

#[async_trait]
impl LlmBackend for LocalHttpProvider {
  fn name(&self) -> &str {
    "local_http"
  }

  async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, AiresError> {
    let body = GenerateRequest {
      model: &request.model,
      system: &request.system_prompt,
      prompt: &request.prompt,
      stream: false,
      format: if request.response_format_json { "json" } else { "" },
      options: GenerateOptions { temperature: request.temperature, num_predict: request.max_tokens },
    };

    debug!(model = %request.model, "calling local_http backend");

    let response = self
      .client
      .post(self.generate_url())
      .json(&body)
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          AiresError::Timeout(std::time::Duration::default())
        } else if e.is_connect() {
          AiresError::BackendUnavailable(e.to_string())
        } else {
          AiresError::Transient(e.to_string())
        }
      })?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(%status, "local_http backend returned an error");
      return Err(AiresError::Http { status: status.as_u16(), body });
    }

    let parsed: GenerateResponse = response
      .json()
      .await
      .map_err(|e| AiresError::SchemaMismatch(e.to_string()))?;

    Ok(CompletionResponse { text: parsed.response })
  }
}
