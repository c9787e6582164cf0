//! Turns raw build output text into a typed `ErrorBatch`.
//!
//! Parsing is pluggable: a list of `ErrorParser` implementations is tried
//! in registration order, and the first whose `can_parse` returns true
//! wins. Lines that match none of the recognizers are discarded but
//! counted; if none match at all, the batch fails as `UNPARSABLE`.

mod recognizers;
mod registry;

pub use recognizers::{gcc::GccRecognizer, generic::GenericRecognizer, msvc::MsvcRecognizer, rustc::RustcRecognizer};
pub use registry::{ParseOutcome, ParserRegistry};

use aires_core::domain::CompilerError;

/// A pluggable recognizer for one build tool's diagnostic line format.
pub trait ErrorParser: Send + Sync {
  fn name(&self) -> &str;

  /// Cheap check used to pick a recognizer; should agree with whether
  /// `parse` would return any errors.
  fn can_parse(&self, content: &str) -> bool {
    !self.parse(content).is_empty()
  }

  /// Extracts every diagnostic this recognizer's grammar matches. Lines
  /// that don't match are simply skipped, not treated as an error.
  fn parse(&self, content: &str) -> Vec<CompilerError>;
}
