use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use aires_core::AiresError;

use crate::backend::{CompletionRequest, CompletionResponse, LlmBackend};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// `cloudHTTP` backend: a hosted chat-completions endpoint authenticated
/// with a bearer token, the common shape across OpenAI-compatible cloud
/// providers.
#[derive(Debug, Clone)]
pub struct CloudHttpProvider {
  client: reqwest::Client,
  base_url: String,
  api_key: String,
}

impl CloudHttpProvider {
  pub fn new(api_key: impl Into<String>) -> Self {
    Self { client: reqwest::Client::new(), base_url: DEFAULT_BASE_URL.to_string(), api_key: api_key.into() }
  }

  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = base_url.into();
    self
  }

  pub fn from_env() -> Option<Self> {
    std::env::var("AIRES_CLOUD_API_KEY").ok().map(Self::new)
  }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: [ChatMessage<'a>; 2],
  temperature: f32,
  max_tokens: u32,
  response_format: Option<ResponseFormat<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role: &'a str,
  content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
  #[serde(rename = "type")]
  kind: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
  choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
  message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
  content: String,
}

#[async_trait]
impl LlmBackend for CloudHttpProvider {
  fn name(&self) -> &str {
    "cloud_http"
  }

  async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, AiresError> {
    let body = ChatRequest {
      model: &request.model,
      messages: [
        ChatMessage { role: "system", content: &request.system_prompt },
        ChatMessage { role: "user", content: &request.prompt },
      ],
      temperature: request.temperature,
      max_tokens: request.max_tokens,
      response_format: request.response_format_json.then_some(ResponseFormat { kind: "json_object" }),
    };

    debug!(model = %request.model, "calling cloud_http backend");

    let response = self
      .client
      .post(&self.base_url)
      .bearer_auth(&self.api_key)
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
    if status.as_u16() == 429 {
      return Err(AiresError::RateLimited(std::time::Duration::from_secs(1)));
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(%status, "cloud_http backend returned an error");
      return Err(AiresError::Http { status: status.as_u16(), body });
    }

    let mut parsed: ChatResponse = response
      .json()
      .await
      .map_err(|e| AiresError::SchemaMismatch(e.to_string()))?;

    let choice = parsed
      .choices
      .pop()
      .ok_or_else(|| AiresError::SchemaMismatch("no choices in response".to_string()))?;

    Ok(CompletionResponse { text: choice.message.content })
  }
}
