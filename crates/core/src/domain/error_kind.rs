use serde::{Deserialize, Serialize};

/// Normalized severity, vendor-specific values are mapped onto this set
/// during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Error,
  Warning,
  Info,
}

impl Severity {
  pub fn as_str(&self) -> &'static str {
    match self {
      Severity::Error => "error",
      Severity::Warning => "warning",
      Severity::Info => "info",
    }
  }
}

impl std::fmt::Display for Severity {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Where in the source tree a diagnostic was raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
  pub file_path: String,
  pub line: u32,
  pub column: Option<u32>,
}

/// A single recognized compiler/build diagnostic. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerError {
  pub code: String,
  pub message: String,
  pub severity: Severity,
  pub location: ErrorLocation,
  pub raw_line: String,
}
