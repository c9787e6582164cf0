//! Resolved, typed configuration for AIRES.
//!
//! Loading itself (TOML file + environment overrides) is ambient plumbing,
//! not part of the pipeline's core contract: every other component only
//! ever sees a fully-resolved `Config` value.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::Stage;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub input_directory: PathBuf,
  pub output_directory: PathBuf,
  pub file_pattern: Vec<String>,
  pub poll_interval_seconds: u64,
  pub stable_for: u64,
  pub max_concurrent_batches: usize,
  pub max_stage_attempts: u32,
  pub max_errors_per_batch: usize,
  pub max_publish_attempts: u32,
  pub queue_wait_seconds: u64,
  pub shutdown_grace_seconds: u64,
  pub fatal_db_down_seconds: u64,
  pub retention_days: u32,
  pub health_window_seconds: u64,
  pub stages: StagesConfig,
  pub db: DbConfig,
  pub queue: QueueConfig,
  pub log: LogConfig,
  pub control_socket_path: PathBuf,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      input_directory: PathBuf::new(),
      output_directory: PathBuf::new(),
      file_pattern: vec!["*.txt".to_string(), "*.log".to_string()],
      poll_interval_seconds: 5,
      stable_for: 2,
      max_concurrent_batches: 5,
      max_stage_attempts: 3,
      max_errors_per_batch: 500,
      max_publish_attempts: 10,
      queue_wait_seconds: 10,
      shutdown_grace_seconds: 30,
      fatal_db_down_seconds: 60,
      retention_days: 30,
      health_window_seconds: 300,
      stages: StagesConfig::default(),
      db: DbConfig::default(),
      queue: QueueConfig::default(),
      log: LogConfig::default(),
      control_socket_path: PathBuf::from("/tmp/aires.sock"),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
  pub backend: Backend,
  pub model: String,
  pub timeout_seconds: u64,
  pub temperature: f32,
  pub max_tokens: u32,
  pub system_prompt: String,
}

impl StageConfig {
  fn for_stage(stage: Stage) -> Self {
    Self {
      backend: Backend::LocalHttp,
      model: "default".to_string(),
      timeout_seconds: stage.default_timeout_seconds(),
      temperature: 0.4,
      max_tokens: 8192,
      system_prompt: default_system_prompt(stage),
    }
  }
}

impl Default for StageConfig {
  fn default() -> Self {
    Self::for_stage(Stage::Docs)
  }
}

fn default_system_prompt(stage: Stage) -> String {
  match stage {
    Stage::Docs => {
      "You are a documentation researcher. Given a batch of compiler errors, \
       find and summarize authoritative reference material for each error code."
        .to_string()
    }
    Stage::Context => {
      "You are a codebase analyst. Given Docs findings, explain how the errors \
       relate to each other in this specific codebase."
        .to_string()
    }
    Stage::Pattern => {
      "You are a pattern validator. Check the Context analysis against known \
       patterns and anti-patterns and produce a canonical diagnosis."
        .to_string()
    }
    Stage::Synth => {
      "You are a technical writer. Produce a narrative summary and concrete \
       recommended actions from the prior findings."
        .to_string()
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Backend {
  LocalHttp,
  CloudHttp,
}

impl Default for Backend {
  fn default() -> Self {
    Backend::LocalHttp
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
  pub docs: StageConfig,
  pub context: StageConfig,
  pub pattern: StageConfig,
  pub synth: StageConfig,
}

impl Default for StagesConfig {
  fn default() -> Self {
    Self {
      docs: StageConfig::for_stage(Stage::Docs),
      context: StageConfig::for_stage(Stage::Context),
      pattern: StageConfig::for_stage(Stage::Pattern),
      synth: StageConfig::for_stage(Stage::Synth),
    }
  }
}

impl StagesConfig {
  pub fn get(&self, stage: Stage) -> &StageConfig {
    match stage {
      Stage::Docs => &self.docs,
      Stage::Context => &self.context,
      Stage::Pattern => &self.pattern,
      Stage::Synth => &self.synth,
    }
  }

  pub fn get_mut(&mut self, stage: Stage) -> &mut StageConfig {
    match stage {
      Stage::Docs => &mut self.docs,
      Stage::Context => &mut self.context,
      Stage::Pattern => &mut self.pattern,
      Stage::Synth => &mut self.synth,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
  pub connection_string: String,
  pub max_conns: u32,
}

impl Default for DbConfig {
  fn default() -> Self {
    Self { connection_string: "aires.db".to_string(), max_conns: 20 }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
  pub brokers: Vec<String>,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self { brokers: Vec::new() }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Trace,
  Debug,
  Info,
  Warn,
  Error,
  Fatal,
}

impl LogLevel {
  pub fn as_tracing_filter(&self) -> &'static str {
    match self {
      LogLevel::Trace => "trace",
      LogLevel::Debug => "debug",
      LogLevel::Info => "info",
      LogLevel::Warn => "warn",
      LogLevel::Error => "error",
      LogLevel::Fatal => "error",
    }
  }
}

impl Default for LogLevel {
  fn default() -> Self {
    LogLevel::Info
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  pub level: LogLevel,
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self { level: LogLevel::Info, directory: None }
  }
}

/// Config keys that `reload` is allowed to apply at runtime. Everything
/// else (including AI backend endpoints) requires a restart.
pub const RELOADABLE_KEYS: &[&str] = &[
  "log.level",
  "retention_days",
  "stages.docs.timeout_seconds",
  "stages.context.timeout_seconds",
  "stages.pattern.timeout_seconds",
  "stages.synth.timeout_seconds",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read { path: PathBuf, #[source] source: std::io::Error },
  #[error("failed to parse config file {path}: {source}")]
  Parse { path: PathBuf, #[source] source: toml::de::Error },
  #[error("missing required key: {0}")]
  MissingRequired(String),
  #[error("invalid environment override {key}={value}: {reason}")]
  InvalidOverride { key: String, value: String, reason: String },
}

impl Config {
  /// Loads configuration from a TOML file, then layers `AIRES_`-prefixed,
  /// dotted-uppercase environment overrides on top (e.g.
  /// `AIRES_STAGES_1_MODEL` overrides `stages.docs.model`).
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path)
      .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let mut config: Config = toml::from_str(&text)
      .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    config.apply_env_overrides(std::env::vars())?;
    config.validate()?;
    Ok(config)
  }

  fn apply_env_overrides(
    &mut self,
    vars: impl Iterator<Item = (String, String)>,
  ) -> Result<(), ConfigError> {
    for (key, value) in vars {
      let Some(rest) = key.strip_prefix("AIRES_") else { continue };
      self.apply_override(rest, &value)?;
    }
    Ok(())
  }

  fn apply_override(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidOverride {
      key: key.to_string(),
      value: value.to_string(),
      reason: reason.to_string(),
    };
    match key {
      "INPUT_DIRECTORY" => self.input_directory = PathBuf::from(value),
      "OUTPUT_DIRECTORY" => self.output_directory = PathBuf::from(value),
      "POLL_INTERVAL_SECONDS" => {
        self.poll_interval_seconds = value.parse().map_err(|_| invalid("expected integer"))?
      }
      "STABLE_FOR" => self.stable_for = value.parse().map_err(|_| invalid("expected integer"))?,
      "MAX_CONCURRENT_BATCHES" => {
        self.max_concurrent_batches = value.parse().map_err(|_| invalid("expected integer"))?
      }
      "MAX_STAGE_ATTEMPTS" => {
        self.max_stage_attempts = value.parse().map_err(|_| invalid("expected integer"))?
      }
      "RETENTION_DAYS" => {
        self.retention_days = value.parse().map_err(|_| invalid("expected integer"))?
      }
      "LOG_LEVEL" => {
        self.log.level = match value.to_lowercase().as_str() {
          "trace" => LogLevel::Trace,
          "debug" => LogLevel::Debug,
          "info" => LogLevel::Info,
          "warn" => LogLevel::Warn,
          "error" => LogLevel::Error,
          "fatal" => LogLevel::Fatal,
          _ => return Err(invalid("expected trace|debug|info|warn|error|fatal")),
        }
      }
      "STAGES_1_MODEL" => self.stages.docs.model = value.to_string(),
      "STAGES_2_MODEL" => self.stages.context.model = value.to_string(),
      "STAGES_3_MODEL" => self.stages.pattern.model = value.to_string(),
      "STAGES_4_MODEL" => self.stages.synth.model = value.to_string(),
      "STAGES_1_BACKEND" | "STAGES_2_BACKEND" | "STAGES_3_BACKEND" | "STAGES_4_BACKEND" => {
        let backend = match value.to_lowercase().as_str() {
          "localhttp" | "local_http" => Backend::LocalHttp,
          "cloudhttp" | "cloud_http" => Backend::CloudHttp,
          _ => return Err(invalid("expected localHTTP|cloudHTTP")),
        };
        let stage = match key {
          "STAGES_1_BACKEND" => Stage::Docs,
          "STAGES_2_BACKEND" => Stage::Context,
          "STAGES_3_BACKEND" => Stage::Pattern,
          _ => Stage::Synth,
        };
        self.stages.get_mut(stage).backend = backend;
      }
      "DB_CONNECTION_STRING" => self.db.connection_string = value.to_string(),
      _ => {} // unrecognized overrides are ignored, not fatal
    }
    Ok(())
  }

  fn validate(&self) -> Result<(), ConfigError> {
    if self.input_directory.as_os_str().is_empty() {
      return Err(ConfigError::MissingRequired("inputDirectory".to_string()));
    }
    if self.output_directory.as_os_str().is_empty() {
      return Err(ConfigError::MissingRequired("outputDirectory".to_string()));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn env_override_applies_dotted_uppercase_model() {
    let mut config =
      Config { input_directory: "/in".into(), output_directory: "/out".into(), ..Config::default() };
    config
      .apply_env_overrides(std::iter::once((
        "AIRES_STAGES_1_MODEL".to_string(),
        "gpt-5".to_string(),
      )))
      .unwrap();
    assert_eq!(config.stages.docs.model, "gpt-5");
  }

  #[test]
  fn validate_requires_directories() {
    let config = Config::default();
    assert!(config.validate().is_err());
  }

  #[test]
  fn reloadable_keys_exclude_backend_endpoints() {
    assert!(!RELOADABLE_KEYS.contains(&"stages.docs.backend"));
    assert!(RELOADABLE_KEYS.contains(&"log.level"));
  }
}
