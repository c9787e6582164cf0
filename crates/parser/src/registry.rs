use sha2::{Digest, Sha256};
use tracing::warn;

use aires_core::domain::ErrorBatch;

use crate::{GccRecognizer, GenericRecognizer, MsvcRecognizer, RustcRecognizer};
use crate::ErrorParser;

/// Result of running the registry's recognizers against one file's content.
pub enum ParseOutcome {
  Batch(ErrorBatch),
  Unparsable,
}

/// Tries each registered recognizer in order and keeps the first whose
/// `can_parse` succeeds. Recognizer order matters: more specific formats
/// (rustc, msvc, gcc) are tried before the generic fallback so that a line
/// matching both isn't mis-attributed to the wrong error code shape.
pub struct ParserRegistry {
  parsers: Vec<Box<dyn ErrorParser>>,
  max_errors_per_batch: usize,
}

impl ParserRegistry {
  pub fn new(parsers: Vec<Box<dyn ErrorParser>>, max_errors_per_batch: usize) -> Self {
    Self { parsers, max_errors_per_batch }
  }

  /// Wires up the four built-in recognizers in the order they're tried.
  pub fn with_defaults(max_errors_per_batch: usize) -> Self {
    Self::new(
      vec![
        Box::new(RustcRecognizer),
        Box::new(MsvcRecognizer),
        Box::new(GccRecognizer),
        Box::new(GenericRecognizer),
      ],
      max_errors_per_batch,
    )
  }

  pub fn parse(&self, source_file: &str, content: &str) -> ParseOutcome {
    let checksum = checksum_of(content);
    for parser in &self.parsers {
      let errors = parser.parse(content);
      if errors.is_empty() {
        continue;
      }

      let original_count = errors.len();
      let (errors, truncated_from) = if original_count > self.max_errors_per_batch {
        warn!(
          recognizer = parser.name(),
          original_count,
          truncated_to = self.max_errors_per_batch,
          "error count exceeds maxErrorsPerBatch, truncating"
        );
        (errors.into_iter().take(self.max_errors_per_batch).collect(), Some(original_count))
      } else {
        (errors, None)
      };

      return match ErrorBatch::new(source_file, checksum, errors, truncated_from) {
        Some(batch) => ParseOutcome::Batch(batch),
        None => ParseOutcome::Unparsable,
      };
    }
    ParseOutcome::Unparsable
  }
}

fn checksum_of(content: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(content.as_bytes());
  format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn picks_rustc_recognizer_first() {
    let registry = ParserRegistry::with_defaults(500);
    let content = "error[E0308]: mismatched types\n  --> src/main.rs:10:5\n";
    match registry.parse("build.log", content) {
      ParseOutcome::Batch(batch) => assert_eq!(batch.primary_error_code(), "E0308"),
      ParseOutcome::Unparsable => panic!("expected a batch"),
    }
  }

  #[test]
  fn recognizes_embedded_error_code_via_gcc_recognizer() {
    let registry = ParserRegistry::with_defaults(500);
    let content = "main.c:10:5: error: CS0246: 'Foo' not found";
    match registry.parse("build.log", content) {
      ParseOutcome::Batch(batch) => assert_eq!(batch.primary_error_code(), "CS0246"),
      ParseOutcome::Unparsable => panic!("expected a batch"),
    }
  }

  #[test]
  fn falls_back_to_generic_recognizer_for_columnless_lines() {
    // No column segment, so `GccRecognizer` (which requires one) rejects
    // it outright; `GenericRecognizer` accepts the column-less shape.
    let registry = ParserRegistry::with_defaults(500);
    let content = "main.c:10: error something broke";
    match registry.parse("build.log", content) {
      ParseOutcome::Batch(batch) => {
        assert_eq!(batch.primary_error_code(), "GENERIC_ERROR");
        assert_eq!(batch.errors()[0].location.column, None);
      }
      ParseOutcome::Unparsable => panic!("expected a batch"),
    }
  }

  #[test]
  fn unrecognized_content_is_unparsable() {
    let registry = ParserRegistry::with_defaults(500);
    match registry.parse("build.log", "Compiling foo v0.1.0\nFinished in 2s\n") {
      ParseOutcome::Unparsable => {}
      ParseOutcome::Batch(_) => panic!("expected unparsable"),
    }
  }

  #[test]
  fn truncates_when_error_count_exceeds_max() {
    let registry = ParserRegistry::with_defaults(2);
    let content = (0..5)
      .map(|i| format!("main.c:{}:1: error: boom{}", i + 1, i))
      .collect::<Vec<_>>()
      .join("\n");
    match registry.parse("build.log", &content) {
      ParseOutcome::Batch(batch) => {
        assert_eq!(batch.errors().len(), 2);
        assert_eq!(batch.truncated_from, Some(5));
      }
      ParseOutcome::Unparsable => panic!("expected a batch"),
    }
  }
}
