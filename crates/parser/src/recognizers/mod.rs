pub mod gcc;
pub mod generic;
pub mod msvc;
pub mod rustc;

use aires_core::domain::Severity;

/// Maps vendor-specific severity spellings onto the normalized set.
pub(crate) fn normalize_severity(raw: &str) -> Option<Severity> {
  match raw.to_lowercase().as_str() {
    "error" | "fatal error" | "fatal" => Some(Severity::Error),
    "warning" | "warn" => Some(Severity::Warning),
    "info" | "note" | "information" => Some(Severity::Info),
    _ => None,
  }
}

/// A token that looks like an embedded error code (e.g. `CS0246`): no
/// spaces, at least one digit, distinguishing it from plain prose.
pub(crate) fn looks_like_error_code(token: &str) -> bool {
  !token.is_empty()
    && !token.contains(' ')
    && token.len() <= 16
    && token.chars().any(|c| c.is_ascii_digit())
    && token.chars().all(|c| c.is_ascii_alphanumeric())
}
