use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use aires_core::config::{Backend, StageConfig};
use aires_core::domain::{AIResearchFinding, ErrorBatch, Stage};
use aires_core::AiresError;

use crate::backend::{CompletionRequest, LlmBackend};
use crate::prompt::compose_prompt;
use crate::rate_limit::{RateLimitConfig, TokenBucket};

/// Stage response schema per §4.4: a self-assessed confidence, a
/// human-readable summary, and an open `details` bag the stage-specific
/// prompt asked for.
#[derive(Debug, Deserialize)]
struct StageResponseSchema {
  confidence: f64,
  summary: String,
  #[serde(default)]
  details: serde_json::Map<String, serde_json::Value>,
}

/// The uniform call surface over `localHTTP`/`cloudHTTP` backends described
/// in §4.4: one retrying, rate-limited, timeout-enforcing front door that
/// hides which concrete backend answered.
pub struct AiClient {
  backends: HashMap<Backend, Arc<dyn LlmBackend>>,
  limiters: HashMap<Backend, TokenBucket>,
  queue_wait: Duration,
}

impl AiClient {
  pub fn new(
    backends: HashMap<Backend, Arc<dyn LlmBackend>>,
    rate_limits: HashMap<Backend, RateLimitConfig>,
    queue_wait: Duration,
  ) -> Self {
    let limiters = rate_limits.into_iter().map(|(backend, config)| (backend, TokenBucket::new(config))).collect();
    Self { backends, limiters, queue_wait }
  }

  /// `analyze(stage, prompt, schema) → Finding | Error`, per §4.4. Makes
  /// exactly one call attempt: retrying a retryable error is the caller's
  /// job (the stage worker requeues through the durable outbox, persisting
  /// `attempts` as it goes — see `maxStageAttempts`), not this client's.
  pub async fn analyze(
    &self,
    stage: Stage,
    stage_config: &StageConfig,
    batch: &ErrorBatch,
    prior_findings: &[AIResearchFinding],
  ) -> Result<AIResearchFinding, AiresError> {
    let backend = self
      .backends
      .get(&stage_config.backend)
      .ok_or_else(|| AiresError::Config(format!("no AI backend registered for {:?}", stage_config.backend)))?;

    if let Some(limiter) = self.limiters.get(&stage_config.backend) {
      limiter.acquire(self.queue_wait).await?;
    }

    let prompt = compose_prompt(&stage_config.system_prompt, batch, prior_findings);
    let request = CompletionRequest {
      model: stage_config.model.clone(),
      system_prompt: stage_config.system_prompt.clone(),
      prompt,
      temperature: stage_config.temperature,
      max_tokens: stage_config.max_tokens,
      response_format_json: true,
    };
    let timeout = Duration::from_secs(stage_config.timeout_seconds);

    let response = match tokio::time::timeout(timeout, backend.complete(&request)).await {
      Ok(result) => result?,
      Err(_) => return Err(AiresError::Timeout(timeout)),
    };

    debug!(stage = %stage, backend = backend.name(), "AI client call succeeded");

    let parsed: StageResponseSchema =
      serde_json::from_str(&response.text).map_err(|e| AiresError::SchemaMismatch(e.to_string()))?;

    Ok(AIResearchFinding {
      stage,
      batch_id: batch.batch_id,
      produced_at: Utc::now(),
      confidence: parsed.confidence,
      summary: parsed.summary,
      details: parsed.details,
      raw_model_response: response.text,
      model: stage_config.model.clone(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::CompletionResponse;
  use aires_core::domain::{CompilerError, ErrorLocation, Severity};
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[derive(Clone)]
  struct MockBackend {
    responses: Arc<Vec<Result<&'static str, AiresError>>>,
    calls: Arc<AtomicU32>,
  }

  impl MockBackend {
    fn new(responses: Vec<Result<&'static str, AiresError>>) -> Self {
      Self { responses: Arc::new(responses), calls: Arc::new(AtomicU32::new(0)) }
    }
  }

  #[async_trait]
  impl LlmBackend for MockBackend {
    fn name(&self) -> &str {
      "mock"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, AiresError> {
      let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
      match &self.responses[idx] {
        Ok(text) => Ok(CompletionResponse { text: text.to_string() }),
        Err(AiresError::Transient(msg)) => Err(AiresError::Transient(msg.clone())),
        Err(_) => Err(AiresError::SchemaMismatch("mock error".to_string())),
      }
    }
  }

  fn sample_batch() -> ErrorBatch {
    let error = CompilerError {
      code: "E0308".to_string(),
      message: "mismatched types".to_string(),
      severity: Severity::Error,
      location: ErrorLocation { file_path: "src/main.rs".to_string(), line: 10, column: Some(5) },
      raw_line: "error[E0308]: mismatched types".to_string(),
    };
    ErrorBatch::new("build.log", "deadbeef", vec![error], None).unwrap()
  }

  #[tokio::test]
  async fn analyze_parses_a_successful_response() {
    let backend: Arc<dyn LlmBackend> =
      Arc::new(MockBackend::new(vec![Ok(r#"{"confidence":0.9,"summary":"looks fine","details":{}}"#)]));
    let mut backends: HashMap<Backend, Arc<dyn LlmBackend>> = HashMap::new();
    backends.insert(Backend::LocalHttp, backend);
    let client = AiClient::new(backends, HashMap::new(), Duration::from_secs(1));

    let batch = sample_batch();
    let stage_config = StageConfig::default();
    let finding = client.analyze(Stage::Docs, &stage_config, &batch, &[]).await.unwrap();
    assert_eq!(finding.summary, "looks fine");
    assert!((finding.confidence - 0.9).abs() < f64::EPSILON);
  }

  #[tokio::test]
  async fn analyze_makes_exactly_one_attempt_on_transient_failure() {
    // A transient error surfaces immediately rather than being retried
    // in-client: retrying is the stage worker's job, so it can persist
    // `attempts` durably instead of this call silently absorbing it.
    let mock = MockBackend::new(vec![
      Err(AiresError::Transient("503".to_string())),
      Ok(r#"{"confidence":0.5,"summary":"never reached","details":{}}"#),
    ]);
    let calls = mock.calls.clone();
    let backend: Arc<dyn LlmBackend> = Arc::new(mock);
    let mut backends: HashMap<Backend, Arc<dyn LlmBackend>> = HashMap::new();
    backends.insert(Backend::LocalHttp, backend);
    let client = AiClient::new(backends, HashMap::new(), Duration::from_secs(1));

    let batch = sample_batch();
    let stage_config = StageConfig::default();
    let result = client.analyze(Stage::Docs, &stage_config, &batch, &[]).await;
    assert!(matches!(result, Err(AiresError::Transient(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn analyze_surfaces_schema_mismatch_without_retry() {
    let backend: Arc<dyn LlmBackend> = Arc::new(MockBackend::new(vec![Ok("not json")]));
    let mut backends: HashMap<Backend, Arc<dyn LlmBackend>> = HashMap::new();
    backends.insert(Backend::LocalHttp, backend);
    let client = AiClient::new(backends, HashMap::new(), Duration::from_secs(1));

    let batch = sample_batch();
    let stage_config = StageConfig::default();
    let result = client.analyze(Stage::Docs, &stage_config, &batch, &[]).await;
    assert!(matches!(result, Err(AiresError::SchemaMismatch(_))));
  }
}
