use thiserror::Error;

/// Error kinds that cross a component boundary inside AIRES.
///
/// Grouped by the taxonomy in the error-handling design: `InputError` and
/// `PermanentBackendError` never retry; `TransientBackendError` and
/// `InfrastructureError` do, up to their component's own retry policy.
#[derive(Error, Debug)]
pub enum AiresError {
  #[error("input error: {0}")]
  Input(String),

  #[error("unparsable content: {0}")]
  Unparsable(String),

  #[error("transient backend error: {0}")]
  Transient(String),

  #[error("backend timed out after {0:?}")]
  Timeout(std::time::Duration),

  #[error("rate limited, retry after {0:?}")]
  RateLimited(std::time::Duration),

  #[error("http error: status {status}, body: {body}")]
  Http { status: u16, body: String },

  #[error("response did not match expected schema: {0}")]
  SchemaMismatch(String),

  #[error("backend unavailable: {0}")]
  BackendUnavailable(String),

  #[error("poison message: payload could not be deserialized: {0}")]
  PoisonMessage(String),

  #[error("infrastructure error: {0}")]
  Infrastructure(String),

  #[error("config error: {0}")]
  Config(String),

  #[error("state machine violation: {0}")]
  InvalidTransition(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("http client error: {0}")]
  Reqwest(#[from] reqwest::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("toml parse error: {0}")]
  TomlParse(#[from] toml::de::Error),
}

impl AiresError {
  /// Whether this error kind should be retried per the stage/client retry
  /// policy, or is permanent and should fail the batch immediately.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      AiresError::Transient(_)
        | AiresError::Timeout(_)
        | AiresError::RateLimited(_)
        | AiresError::BackendUnavailable(_)
        | AiresError::Infrastructure(_)
    ) || matches!(self, AiresError::Http { status, .. } if *status >= 500)
  }
}
